//! Test runner for orchestrating health checks

use std::any::Any;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};

use super::check::{CheckStatus, SystemCheck};
use super::context::Ctx;
use super::error::CheckError;
use super::live::Sink;
use super::report::HealthCheckReport;
use super::session::Session;

/// Message attached to checks bypassed through the skip list
pub const SKIPPED_BY_REQUEST: &str = "skipped by user request";

/// Runs `check` as a named child of the span `ctx` points at
///
/// A skip-listed `name` is recorded as skipped and `check` never runs. Otherwise
/// the callback gets a carrier for the new span; an error or a panic marks the
/// span failed with the error text. The span is closed in every case and the
/// callback's outcome is returned unchanged, already recorded.
pub fn test<F>(ctx: &Ctx, name: &str, check: F) -> anyhow::Result<()>
where
    F: FnOnce(&Ctx) -> anyhow::Result<()>,
{
    let child = {
        let Some(session) = ctx.session() else {
            return check(ctx);
        };
        if session.is_skipped(name) {
            session.add_leaf(
                ctx.span_id(),
                name,
                CheckStatus::Skipped,
                Some(SKIPPED_BY_REQUEST.to_string()),
            );
            return Ok(());
        }
        ctx.derive(session.start_child(ctx.span_id(), name))
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| check(&child)))
        .unwrap_or_else(|payload| Err(CheckError::Panicked(panic_message(payload)).into()));

    if let Some(session) = child.session() {
        if let Err(err) = &outcome {
            session.assign(child.span_id(), CheckStatus::Fail, Some(format!("{err:#}")));
        }
        session.end(child.span_id());
    }
    outcome
}

/// Runs a [`SystemCheck`] under its own name
pub fn run_system_check(ctx: &Ctx, check: &dyn SystemCheck) -> anyhow::Result<()> {
    test(ctx, check.name(), |ctx| check.check(ctx))
}

/// Records `name` as skipped by request if it is on the skip list
///
/// For stages driven through [`start_span`] rather than [`test`].
pub fn skip_requested(ctx: &Ctx, name: &str) -> bool {
    if !ctx.is_skipped(name) {
        return false;
    }
    spot(ctx, name, CheckStatus::Skipped, SKIPPED_BY_REQUEST.to_string());
    true
}

/// Records a passing leaf check
pub fn spot_ok(ctx: &Ctx, name: &str, message: impl Into<String>) {
    spot(ctx, name, CheckStatus::Ok, message.into());
}

/// Records a leaf check that passed with a warning
pub fn spot_warn(ctx: &Ctx, name: &str, message: impl Into<String>) {
    spot(ctx, name, CheckStatus::Warn, message.into());
}

/// Records a leaf check that was not applicable
pub fn spot_skipped(ctx: &Ctx, name: &str, message: impl Into<String>) {
    spot(ctx, name, CheckStatus::Skipped, message.into());
}

/// Records a failed leaf check and hands the error back for propagation
pub fn spot_error(ctx: &Ctx, name: &str, err: impl Into<anyhow::Error>) -> anyhow::Error {
    let err = err.into();
    spot(ctx, name, CheckStatus::Fail, format!("{err:#}"));
    err
}

fn spot(ctx: &Ctx, name: &str, status: CheckStatus, message: String) {
    if let Some(session) = ctx.session() {
        session.add_leaf(ctx.span_id(), name, status, Some(message));
    }
}

/// Adds a warning to the current span
pub fn warn(ctx: &Ctx, message: impl Into<String>) {
    assign(ctx, CheckStatus::Warn, message.into());
}

/// Marks the current span failed
pub fn fail(ctx: &Ctx, message: impl Into<String>) {
    assign(ctx, CheckStatus::Fail, message.into());
}

/// Marks the current span skipped; children that ran still count
pub fn skipped(ctx: &Ctx, message: impl Into<String>) {
    assign(ctx, CheckStatus::Skipped, message.into());
}

/// Marks the current span failed with an error's text
pub fn error(ctx: &Ctx, err: &anyhow::Error) {
    fail(ctx, format!("{err:#}"));
}

fn assign(ctx: &Ctx, status: CheckStatus, message: String) {
    if let Some(session) = ctx.session() {
        session.assign(ctx.span_id(), status, Some(message));
    }
}

/// Opens a span that stays running until the returned guard is dropped
pub fn start_span(ctx: &Ctx, name: &str) -> SpanGuard {
    let ctx = match ctx.session() {
        Some(session) => ctx.derive(session.start_child(ctx.span_id(), name)),
        None => ctx.clone(),
    };
    SpanGuard { ctx }
}

/// Closes its span when dropped
#[derive(Debug)]
pub struct SpanGuard {
    ctx: Ctx,
}

impl SpanGuard {
    pub fn ctx(&self) -> &Ctx {
        &self.ctx
    }

    /// Closes the span now
    pub fn end(self) {}
}

impl Deref for SpanGuard {
    type Target = Ctx;

    fn deref(&self) -> &Ctx {
        &self.ctx
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(session) = self.ctx.session() {
            session.end(self.ctx.span_id());
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs a flat list of checks in a fresh session
pub struct HealthCheckRunner {
    checks: Vec<Box<dyn SystemCheck>>,
    skip: Vec<String>,
}

impl HealthCheckRunner {
    /// Creates a new runner with no checks
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            skip: Vec::new(),
        }
    }

    /// Adds a check to the runner
    pub fn add_check<C: SystemCheck + 'static>(mut self, check: C) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Bypasses the check with this name
    pub fn skip(mut self, name: impl Into<String>) -> Self {
        self.skip.push(name.into());
        self
    }

    /// Runs all registered checks without live output
    pub fn run(self) -> HealthCheckReport {
        self.run_with_sink(Sink::discard())
    }

    /// Runs all registered checks in declaration order and finalizes
    pub fn run_with_sink(self, sink: Sink) -> HealthCheckReport {
        let session = Session::new(sink);
        session.set_skip_list(&self.skip);
        let ctx = session.ctx();

        for check in &self.checks {
            // Failures are already recorded in the tree
            let _ = run_system_check(&ctx, check.as_ref());
        }

        session.finalize()
    }
}

impl Default for HealthCheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_error_is_recorded_and_returned() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let result = test(&ctx, "storage", |_| Err(anyhow!("disk full")));
        assert_eq!(result.unwrap_err().to_string(), "disk full");

        let report = session.finalize();
        let storage = report.find(&["storage"]).unwrap();
        assert_eq!(storage.status, CheckStatus::Fail);
        assert_eq!(storage.messages, ["disk full"]);
    }

    #[test]
    fn test_panic_becomes_failure() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let result = test(&ctx, "explodes", |_| panic!("kaboom"));
        assert!(result.is_err());

        let report = session.finalize();
        let node = report.find(&["explodes"]).unwrap();
        assert_eq!(node.status, CheckStatus::Fail);
        assert_eq!(node.messages, ["check panicked: kaboom"]);
    }

    #[test]
    fn test_spot_error_returns_same_error() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let err = spot_error(&ctx, "parse-config", anyhow!("bad syntax"));
        assert_eq!(err.to_string(), "bad syntax");
        assert_eq!(
            session.finalize().find(&["parse-config"]).unwrap().status,
            CheckStatus::Fail
        );
    }

    #[test]
    fn test_current_span_setters() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let _ = test(&ctx, "warns", |ctx| {
            warn(ctx, "latency is high");
            Ok(())
        });
        let _ = test(&ctx, "not-configured", |ctx| {
            skipped(ctx, "nothing to check");
            Ok(())
        });

        let report = session.finalize();
        let warns = report.find(&["warns"]).unwrap();
        assert_eq!(warns.status, CheckStatus::Warn);
        assert_eq!(warns.messages, ["latency is high"]);
        assert_eq!(
            report.find(&["not-configured"]).unwrap().status,
            CheckStatus::Skipped
        );
        assert_eq!(report.status(), CheckStatus::Warn);
    }

    #[test]
    fn test_span_guard_closes_on_drop() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        {
            let seal = start_span(&ctx, "create-seal");
            fail(&seal, "seal could not be configured");
        }

        let report = session.finalize();
        let seal = report.find(&["create-seal"]).unwrap();
        assert_eq!(seal.status, CheckStatus::Fail);
        assert_eq!(seal.messages, ["seal could not be configured"]);
    }

    #[test]
    fn test_skip_requested_records_leaf() {
        let session = Session::new(Sink::discard());
        session.set_skip_list(["create-seal"]);
        let ctx = session.ctx();
        assert!(skip_requested(&ctx, "create-seal"));
        assert!(!skip_requested(&ctx, "storage"));

        let report = session.finalize();
        assert_eq!(report.root().children.len(), 1);
        assert_eq!(report.status(), CheckStatus::Skipped);
    }
}
