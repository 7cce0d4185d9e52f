//! Diagnostic session engine for startup health checks
//!
//! Checks are declared as nested callbacks. Each call to [`test`] opens a span
//! under the span its [`Ctx`] points at, so the calls build a tree that is
//! finalized into a [`HealthCheckReport`] and rendered as a terminal tree or as
//! JSON. Useful for:
//! - Validating server startup without starting the server
//! - CI/CD health checks
//! - Debugging initialization issues
//!
//! # Example
//!
//! ```no_run
//! use startup_diagnose::health::{self, Session, Sink};
//!
//! let session = Session::new(Sink::stdout());
//! let ctx = session.ctx();
//! let _ = health::test(&ctx, "storage", |ctx| {
//!     health::spot_ok(ctx, "create-storage-backend", "");
//!     Ok(())
//! });
//!
//! let report = session.finalize();
//! if report.is_healthy() {
//!     println!("All systems operational!");
//! }
//! ```

pub mod check;
pub mod checks;
pub mod context;
pub mod error;
pub mod live;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod session;
pub mod span;
pub mod timeout;

pub use check::{CheckResult, CheckStatus, SystemCheck, rollup};
pub use context::Ctx;
pub use error::CheckError;
pub use live::Sink;
pub use report::HealthCheckReport;
pub use reporter::{format_report, from_json, to_json, write_report};
pub use runner::{
    HealthCheckRunner, SKIPPED_BY_REQUEST, SpanGuard, error, fail, run_system_check,
    skip_requested, skipped, spot_error, spot_ok, spot_skipped, spot_warn, start_span, test,
    warn,
};
pub use session::{ROOT_SPAN_NAME, Session};
pub use timeout::with_timeout;
