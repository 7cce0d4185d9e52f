//! The `diagnose` command
//!
//! Parses arguments, runs the startup check pipeline in a fresh session and
//! renders the result either as a terminal tree or as JSON.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use config::ConfigError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::build_info;
use crate::config::ServerConfig;
use crate::health::checks::{
    OperatingSystemCheck, determine_redirect, diagnose_core, diagnose_ha_storage,
    diagnose_listeners, diagnose_seal, diagnose_service_discovery, diagnose_storage,
    find_cluster_addr,
};
use crate::health::{
    Ctx, HealthCheckReport, Session, Sink, run_system_check, spot_error, spot_ok, test, to_json,
    write_report,
};

/// Every check passed, or every check was skipped
pub const EXIT_OK: i32 = 0;
/// At least one check failed, or the run could not complete
pub const EXIT_FAIL: i32 = 1;
/// No failures but at least one warning
pub const EXIT_WARN: i32 = 2;
/// Bad command line
pub const EXIT_USAGE: i32 = 3;
/// Results could not be serialized
pub const EXIT_SERIALIZE: i32 = 4;

/// How results are written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Live tree while checks run, then the final tree
    #[default]
    Human,
    /// Only the final result, as JSON
    #[value(alias = "structured")]
    Json,
}

/// Troubleshoots server startup without starting the server.
///
/// Runs a series of checks against the given configuration (storage, seal,
/// service discovery, listeners) and reports which of them would stop the
/// server from starting.
#[derive(Parser, Debug)]
#[command(name = "diagnose", version)]
pub struct DiagnoseArgs {
    /// Configuration file or directory; may be repeated
    #[arg(short = 'c', long = "config", value_name = "PATH", required = true)]
    pub configs: Vec<PathBuf>,

    /// Check to skip, e.g. `listener`, `storage` or `create-seal`; may be
    /// repeated or comma-separated
    #[arg(short = 's', long = "skip", value_name = "NAME", value_delimiter = ',')]
    pub skips: Vec<String>,

    /// Show durations in the tree and log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

/// Errors that end the command without a normal result
#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("failed to load configuration")]
    Config(#[from] ConfigError),

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl DiagnoseError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DiagnoseError::Usage(e) => usage_exit_code(e),
            DiagnoseError::Config(_) | DiagnoseError::Io(_) => EXIT_FAIL,
            DiagnoseError::Serialize(_) => EXIT_SERIALIZE,
        }
    }
}

/// `--help` and `--version` are reported by clap as errors but succeed
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() { EXIT_USAGE } else { EXIT_OK }
}

/// Parses a full argument vector, program name first
pub fn parse_args<I, T>(argv: I) -> Result<DiagnoseArgs, DiagnoseError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Ok(DiagnoseArgs::try_parse_from(argv)?)
}

/// Runs the command and returns the process exit code
///
/// `live` receives the tree while checks run in human mode; JSON mode never
/// writes to it. Everything else goes to `out`.
pub fn run<W: Write>(args: &DiagnoseArgs, live: Sink, out: &mut W) -> i32 {
    match execute(args, live, out) {
        Ok(report) => report.exit_code(),
        Err(e) => {
            warn!(error = %e, "Diagnose did not complete");
            e.exit_code()
        }
    }
}

/// Runs the command and returns the finalized report
pub fn execute<W: Write>(
    args: &DiagnoseArgs,
    live: Sink,
    out: &mut W,
) -> Result<HealthCheckReport, DiagnoseError> {
    let human = args.format == OutputFormat::Human;
    let live = if human { live } else { Sink::discard() };
    let width = if live.is_interactive() { terminal_width() } else { 0 };

    if human {
        writeln!(out, "{}", build_info::version_banner())?;
        writeln!(out)?;
        out.flush()?;
    }

    debug!(
        built = build_info::BUILD_TIMESTAMP,
        rustc = build_info::RUSTC_SEMVER,
        channel = build_info::RUSTC_CHANNEL,
        "Build details"
    );
    info!(configs = ?args.configs, skips = ?args.skips, "Starting diagnose");
    let session = Session::new(live);
    session.set_skip_list(&args.skips);

    if let Err(e) = offline_diagnostics(&session.ctx(), args) {
        debug!(error = %format!("{e:#}"), "Remaining checks short-circuited");
    }
    let report = session.finalize();
    drop(session);

    match args.format {
        OutputFormat::Human => {
            writeln!(out)?;
            writeln!(out, "Results:")?;
            write_report(out, &report, width, args.debug)?;
        }
        OutputFormat::Json => {
            let json = to_json(&report)?;
            writeln!(out, "{json}")?;
            out.flush()?;
        }
    }
    Ok(report)
}

/// Loads and merges every `--config` source
pub fn load_config(args: &DiagnoseArgs) -> Result<ServerConfig, DiagnoseError> {
    Ok(ServerConfig::load(&args.configs)?)
}

/// The check pipeline, run under the session root
///
/// An error means the pipeline stopped early; it is already recorded.
pub fn offline_diagnostics(ctx: &Ctx, args: &DiagnoseArgs) -> anyhow::Result<()> {
    let _ = run_system_check(ctx, &OperatingSystemCheck::new());

    let config = load_config(args).map_err(|e| spot_error(ctx, "parse-config", e))?;
    spot_ok(ctx, "parse-config", "");

    let mut backend = None;
    let _ = test(ctx, "storage", |ctx| {
        backend = diagnose_storage(ctx, config.storage.as_ref())?;
        Ok(())
    });

    let _ = test(ctx, "service-discovery", |ctx| {
        diagnose_service_discovery(ctx, config.service_registration.as_ref())
    });

    // Finalizes the seal on every exit path from here on
    let _seal = diagnose_seal(ctx, config.seal.as_ref());

    let _ = test(ctx, "setup-core", diagnose_core);

    let _ = test(ctx, "setup-ha-storage", |ctx| {
        diagnose_ha_storage(ctx, backend.as_ref(), config.ha_storage.as_ref())
    });

    let redirect =
        determine_redirect(&config).map_err(|e| spot_error(ctx, "determine-redirect", e))?;
    spot_ok(ctx, "determine-redirect", redirect);

    let cluster =
        find_cluster_addr(&config).map_err(|e| spot_error(ctx, "find-cluster-addr", e))?;
    spot_ok(ctx, "find-cluster-addr", cluster);

    let _ = test(ctx, "listener", |ctx| diagnose_listeners(ctx, &config.listeners));

    Ok(())
}

/// Width of the controlling terminal, 0 when stdout is not one
pub fn terminal_width() -> usize {
    use std::io::IsTerminal;

    if !io::stdout().is_terminal() {
        return 0;
    }
    crossterm::terminal::size()
        .map(|(columns, _)| usize::from(columns))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_accepts_commas_and_repeats() {
        let args = parse_args([
            "diagnose", "-c", "a.toml", "--skip", "listener,storage", "-s", "create-seal",
        ])
        .unwrap();
        assert_eq!(args.skips, ["listener", "storage", "create-seal"]);
        assert_eq!(args.format, OutputFormat::Human);
        assert!(!args.debug);
    }

    #[test]
    fn test_structured_is_alias_for_json() {
        let args = parse_args(["diagnose", "-c", "a.toml", "-f", "structured"]).unwrap();
        assert_eq!(args.format, OutputFormat::Json);
        let args = parse_args(["diagnose", "-c", "a.toml", "--format", "json"]).unwrap();
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_usage_errors_map_to_exit_codes() {
        assert_eq!(parse_args(["diagnose"]).unwrap_err().exit_code(), EXIT_USAGE);
        assert_eq!(
            parse_args(["diagnose", "-c", "a.toml", "--bogus"])
                .unwrap_err()
                .exit_code(),
            EXIT_USAGE
        );
        assert_eq!(parse_args(["diagnose", "--help"]).unwrap_err().exit_code(), EXIT_OK);
    }

    #[test]
    fn test_config_error_is_a_failure() {
        let err = DiagnoseError::from(ConfigError::Message("bad".into()));
        assert_eq!(err.exit_code(), EXIT_FAIL);
        assert_eq!(format!("{:#}", anyhow::Error::from(err)), "failed to load configuration: bad");
    }
}
