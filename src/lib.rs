//! Startup diagnostics
//!
//! Runs a server's startup checks (configuration, storage, seal, service
//! discovery, listeners) without starting the server, and reports the outcome
//! as a tree of pass/warn/fail/skip results.

/// Build-time information (compiler, target, timestamp)
pub mod build_info;

/// The `diagnose` command: argument parsing, check pipeline and rendering
pub mod command;

/// Configuration of the server being diagnosed
pub mod config;

/// Diagnostic session engine and the built-in checks
pub mod health;
