//! Core health check trait and types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::Ctx;

/// Status of a system check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Not resolved yet; never present in a finalized report
    Unknown,
    /// Check was deliberately bypassed
    Skipped,
    /// Check passed successfully
    Ok,
    /// Check passed with warnings
    Warn,
    /// Check failed
    Fail,
}

impl CheckStatus {
    /// Rank used by rollup: `Fail > Warn > Ok > Skipped > Unknown`
    fn rank(self) -> u8 {
        match self {
            CheckStatus::Unknown => 0,
            CheckStatus::Skipped => 1,
            CheckStatus::Ok => 2,
            CheckStatus::Warn => 3,
            CheckStatus::Fail => 4,
        }
    }

    /// Returns the more severe of two statuses
    pub fn worst(self, other: CheckStatus) -> CheckStatus {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Returns true if the check passed (Ok, Warn or Skipped)
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckStatus::Ok | CheckStatus::Warn | CheckStatus::Skipped)
    }

    /// Returns true if the check failed
    pub fn is_fail(&self) -> bool {
        matches!(self, CheckStatus::Fail)
    }

    /// Returns true once the status is one of the four terminal values
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckStatus::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Unknown => "unknown",
            CheckStatus::Skipped => "skipped",
            CheckStatus::Ok => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
        }
    }

    /// Returns the bracketed tree marker, colored per status
    pub fn as_colored_str(&self) -> String {
        use colored::Colorize;
        match self {
            CheckStatus::Unknown => "[      ]".to_string(),
            CheckStatus::Skipped => "[ skip ]".dimmed().to_string(),
            CheckStatus::Ok => "[  ok  ]".green().to_string(),
            CheckStatus::Warn => "[ warn ]".yellow().to_string(),
            CheckStatus::Fail => "[failed]".red().to_string(),
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes a node's effective status from its direct status and the
/// effective statuses of its children.
///
/// An explicit `Fail` always wins. Otherwise the most severe value is taken,
/// so a subtree that was skipped entirely stays `Skipped` while a single `Ok`
/// sibling lifts it to `Ok`. A node that ran without any assignment and has no
/// children resolves to `Ok`.
pub fn rollup<I>(direct: CheckStatus, children: I) -> CheckStatus
where
    I: IntoIterator<Item = CheckStatus>,
{
    if direct.is_fail() {
        return CheckStatus::Fail;
    }

    match children.into_iter().fold(direct, CheckStatus::worst) {
        CheckStatus::Unknown => CheckStatus::Ok,
        status => status,
    }
}

/// Result of a system check, one node of the finalized tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name the check was declared with
    pub name: String,
    /// Effective status after rollup
    pub status: CheckStatus,
    /// Warnings, the causing error text or a skip reason, in recorded order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    /// Wall clock start; absent for skipped checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// How long the check took
    #[serde(
        default,
        rename = "duration_ms",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    /// Nested checks in execution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CheckResult>,
}

impl CheckResult {
    /// Looks up a direct child by name
    pub fn child(&self, name: &str) -> Option<&CheckResult> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a path of child names from this node
    pub fn find(&self, path: &[&str]) -> Option<&CheckResult> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Depth-first iterator over this node and all descendants
    pub fn walk(&self) -> impl Iterator<Item = &CheckResult> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_f64(d.as_secs_f64() * 1000.0),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|ms| Duration::try_from_secs_f64(ms / 1000.0).map_err(D::Error::custom))
            .transpose()
    }
}

/// Trait for system health checks
pub trait SystemCheck {
    /// Name of the system being checked, also the name matched by the skip list
    fn name(&self) -> &'static str;

    /// Perform the health check, recording nested results under `ctx`
    fn check(&self, ctx: &Ctx) -> anyhow::Result<()>;
}
