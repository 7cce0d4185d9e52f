use std::time::Duration;

use thiserror::Error;

/// Failures produced by the engine itself rather than by a check
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("check panicked: {0}")]
    Panicked(String),
    #[error("check worker exited without reporting a result")]
    WorkerLost,
}
