//! Deadline enforcement around check callbacks

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use super::context::Ctx;
use super::error::CheckError;
use super::runner::panic_message;

/// Wraps `check` so that the caller is released after `deadline`
///
/// The returned callback has the same shape as `check` and is meant to be
/// passed to [`test`](super::runner::test). `check` runs on its own thread
/// while the caller waits for either its outcome or the deadline. When the
/// deadline wins, the caller gets [`CheckError::DeadlineExceeded`] straight
/// away.
///
/// This timeout is not preemptive. Work that does not observe cancellation
/// keeps running on the abandoned thread after the failure has been reported,
/// and any resources it holds are released only when it finishes on its own.
/// An abandoned check may still add spans under its carrier; they are ignored
/// once the session has been finalized or dropped.
pub fn with_timeout<F>(deadline: Duration, check: F) -> impl FnOnce(&Ctx) -> anyhow::Result<()>
where
    F: FnOnce(&Ctx) -> anyhow::Result<()> + Send + 'static,
{
    move |ctx: &Ctx| {
        let (tx, rx) = mpsc::channel();
        let worker_ctx = ctx.clone();

        thread::Builder::new()
            .name("diagnose-check".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| check(&worker_ctx)))
                    .unwrap_or_else(|payload| {
                        Err(CheckError::Panicked(panic_message(payload)).into())
                    });
                // The receiver is gone if the deadline already passed
                let _ = tx.send(outcome);
            })?;

        match rx.recv_timeout(deadline) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                warn!(?deadline, "Check exceeded its deadline, abandoning worker");
                Err(CheckError::DeadlineExceeded(deadline).into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(CheckError::WorkerLost.into()),
        }
    }
}
