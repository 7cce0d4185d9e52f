//! Finalized result tree for one diagnostic run

use serde::{Deserialize, Serialize};

use super::check::{CheckResult, CheckStatus};

/// Immutable results of a finalized session
///
/// Serializes as the root [`CheckResult`], so the top-level `status` field is
/// the overall outcome of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthCheckReport {
    root: CheckResult,
}

impl HealthCheckReport {
    pub(crate) fn new(root: CheckResult) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &CheckResult {
        &self.root
    }

    /// Overall status of the run
    pub fn status(&self) -> CheckStatus {
        self.root.status
    }

    /// Follows a path of check names below the root
    pub fn find(&self, path: &[&str]) -> Option<&CheckResult> {
        self.root.find(path)
    }

    /// Returns true if no check failed
    pub fn is_healthy(&self) -> bool {
        !self.status().is_fail()
    }

    /// Returns true if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.root.walk().any(|r| r.status == CheckStatus::Warn)
    }

    /// Number of leaf checks that ended with `status`
    pub fn count(&self, status: CheckStatus) -> usize {
        self.root
            .walk()
            .filter(|r| r.children.is_empty() && r.status == status)
            .count()
    }

    /// Returns the appropriate exit code for this report
    /// 0 = ok or skipped, 1 = any fail, 2 = any warn (but no fail)
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            CheckStatus::Fail => 1,
            CheckStatus::Warn => 2,
            CheckStatus::Ok | CheckStatus::Skipped | CheckStatus::Unknown => 0,
        }
    }
}
