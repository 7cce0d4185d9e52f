//! Formatting and reporting for health check results

use std::io::{self, Write};

use colored::Colorize;

use super::check::{CheckResult, CheckStatus};
use super::report::HealthCheckReport;

/// Width of a status marker plus the space after it
const MARKER_WIDTH: usize = 9;

/// Formats a report as an indented tree followed by a summary
///
/// Messages are wrapped to `width` columns; a width of 0 disables wrapping.
/// With `verbose` set, each line also shows how long the check took.
pub fn format_report(report: &HealthCheckReport, width: usize, verbose: bool) -> String {
    let mut output = String::new();
    format_node(&mut output, report.root(), 0, width, verbose);
    output.push_str(&format_summary(report));
    output
}

fn format_node(out: &mut String, node: &CheckResult, depth: usize, width: usize, verbose: bool) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{}{} {}", indent, node.status.as_colored_str(), node.name));
    if verbose && let Some(duration) = node.duration {
        let elapsed = format!(" ({:.2?})", duration);
        out.push_str(&elapsed.as_str().dimmed().to_string());
    }
    out.push('\n');

    let pad = format!("{}{}", indent, " ".repeat(MARKER_WIDTH));
    for message in &node.messages {
        out.push_str(&wrap_message(message, &pad, width));
        out.push('\n');
    }

    for child in &node.children {
        format_node(out, child, depth + 1, width, verbose);
    }
}

fn wrap_message(message: &str, pad: &str, width: usize) -> String {
    if width == 0 {
        return message
            .lines()
            .map(|line| format!("{pad}{line}"))
            .collect::<Vec<_>>()
            .join("\n");
    }

    let options = textwrap::Options::new(width)
        .initial_indent(pad)
        .subsequent_indent(pad);
    textwrap::fill(message, options)
}

/// Formats the summary section of the report
fn format_summary(report: &HealthCheckReport) -> String {
    let mut summary = String::new();

    let passed = report.count(CheckStatus::Ok);
    let warned = report.count(CheckStatus::Warn);
    let failed = report.count(CheckStatus::Fail);
    let skipped = report.count(CheckStatus::Skipped);

    summary.push_str(&format!("\n{}\n", "Summary".bold().underline()));
    summary.push_str(&format!(
        "  Total checks: {}\n",
        passed + warned + failed + skipped
    ));
    summary.push_str(&format!("  {} Passed: {}\n", "✓".green(), passed));

    if warned > 0 {
        summary.push_str(&format!("  {} Warned: {}\n", "⚠".yellow(), warned));
    }

    if failed > 0 {
        summary.push_str(&format!("  {} Failed: {}\n", "✗".red(), failed));
    }

    if skipped > 0 {
        summary.push_str(&format!("  {} Skipped: {}\n", "-".dimmed(), skipped));
    }

    summary.push('\n');
    let overall = match report.status() {
        CheckStatus::Fail => "Overall: UNHEALTHY".red().bold(),
        CheckStatus::Warn => "Overall: HEALTHY (with warnings)".yellow().bold(),
        CheckStatus::Skipped => "Overall: SKIPPED".dimmed().bold(),
        CheckStatus::Ok | CheckStatus::Unknown => "Overall: HEALTHY".green().bold(),
    };
    summary.push_str(&format!("  {}\n", overall));

    summary
}

/// Writes the formatted tree to `w`
pub fn write_report<W: Write>(
    w: &mut W,
    report: &HealthCheckReport,
    width: usize,
    verbose: bool,
) -> io::Result<()> {
    w.write_all(format_report(report, width, verbose).as_bytes())?;
    w.flush()
}

/// Serializes a report as pretty-printed JSON with two-space indentation
pub fn to_json(report: &HealthCheckReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Parses a report previously produced by [`to_json`]
pub fn from_json(json: &str) -> serde_json::Result<HealthCheckReport> {
    serde_json::from_str(json)
}
