//! Session state for one diagnostic run

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use tracing::{debug, info};

use super::check::CheckStatus;
use super::context::Ctx;
use super::live::{LiveWriter, Sink};
use super::report::HealthCheckReport;
use super::span::{SpanId, SpanTree};

/// Name of the synthetic span every check is nested under
pub const ROOT_SPAN_NAME: &str = "initialization";

/// Owns the span tree, skip list and live output of a single run
///
/// Checks never hold the session directly; they receive a [`Ctx`] obtained
/// from [`Session::ctx`]. The session is the sole owner of every span and is
/// not reused once [`Session::finalize`] has produced a report.
#[derive(Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    tree: Mutex<SpanTree>,
    skip_list: RwLock<HashSet<String>>,
    live: Mutex<LiveWriter>,
    report: OnceLock<HealthCheckReport>,
}

impl Session {
    /// Creates a session whose live progress goes to `sink`
    pub fn new(sink: Sink) -> Self {
        let inner = SessionInner {
            tree: Mutex::new(SpanTree::new(ROOT_SPAN_NAME)),
            skip_list: RwLock::new(HashSet::new()),
            live: Mutex::new(LiveWriter::new(sink)),
            report: OnceLock::new(),
        };
        inner.notify_started(SpanId::ROOT, 0, ROOT_SPAN_NAME);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Replaces the set of check names to bypass; matching ignores case
    pub fn set_skip_list<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: HashSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        if !names.is_empty() {
            info!(skip = ?names, "Skipping checks by request");
        }
        *self
            .inner
            .skip_list
            .write()
            .unwrap_or_else(PoisonError::into_inner) = names;
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.inner.is_skipped(name)
    }

    /// Carrier pointing at the root span
    pub fn ctx(&self) -> Ctx {
        Ctx::new(Arc::downgrade(&self.inner), SpanId::ROOT)
    }

    /// Resolves every span bottom-up and returns the result snapshot
    ///
    /// Call only after all checks started on this session have returned;
    /// workers abandoned by a timeout are the exception and their spans show up
    /// as failed if still open. The first call closes the root and fixes the
    /// snapshot; later calls return the same report.
    pub fn finalize(&self) -> HealthCheckReport {
        self.inner
            .report
            .get_or_init(|| {
                self.inner.end(SpanId::ROOT);
                let report = HealthCheckReport::new(self.inner.tree().snapshot(SpanId::ROOT));
                info!(status = %report.status(), "Diagnostics finalized");
                report
            })
            .clone()
    }
}

impl SessionInner {
    fn tree(&self) -> MutexGuard<'_, SpanTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_skipped(&self, name: &str) -> bool {
        self.skip_list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&name.to_lowercase())
    }

    pub(crate) fn start_child(&self, parent: SpanId, name: &str) -> SpanId {
        let (id, depth) = {
            let mut tree = self.tree();
            let id = tree.start_child(parent, name);
            (id, tree.depth(id))
        };
        debug!(check = %name, "Check started");
        self.notify_started(id, depth, name);
        id
    }

    pub(crate) fn add_leaf(
        &self,
        parent: SpanId,
        name: &str,
        status: CheckStatus,
        message: Option<String>,
    ) {
        let (id, depth) = {
            let mut tree = self.tree();
            let id = tree.add_leaf(parent, name, status, message);
            (id, tree.depth(id))
        };
        debug!(check = %name, %status, "Check reported");
        self.notify_finished(id, depth, name, status);
    }

    pub(crate) fn assign(&self, id: SpanId, status: CheckStatus, message: Option<String>) {
        self.tree().assign(id, status, message);
    }

    pub(crate) fn end(&self, id: SpanId) {
        let (name, depth, status, elapsed) = {
            let mut tree = self.tree();
            tree.end(id);
            let span = tree.get(id);
            (span.name.clone(), tree.depth(id), tree.effective(id), span.duration)
        };
        debug!(check = %name, %status, ?elapsed, "Check finished");
        self.notify_finished(id, depth, &name, status);
    }

    fn live(&self) -> MutexGuard<'_, LiveWriter> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_started(&self, id: SpanId, depth: usize, name: &str) {
        if let Err(e) = self.live().started(id, depth, name) {
            debug!(error = %e, "Failed to write live output");
        }
    }

    fn notify_finished(&self, id: SpanId, depth: usize, name: &str, status: CheckStatus) {
        if let Err(e) = self.live().finished(id, depth, name, status) {
            debug!(error = %e, "Failed to write live output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_list_ignores_case() {
        let session = Session::new(Sink::discard());
        session.set_skip_list(["Listener", " storage "]);
        assert!(session.is_skipped("listener"));
        assert!(session.is_skipped("LISTENER"));
        assert!(session.is_skipped("storage"));
        assert!(!session.is_skipped("listener-tls"));
    }

    #[test]
    fn test_empty_session_finalizes_ok() {
        let session = Session::new(Sink::discard());
        let report = session.finalize();
        assert_eq!(report.root().name, ROOT_SPAN_NAME);
        assert_eq!(report.status(), CheckStatus::Ok);
        assert!(report.root().duration.is_some());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        session.inner.add_leaf(ctx.span_id(), "a", CheckStatus::Warn, None);
        let first = session.finalize();
        session.inner.add_leaf(ctx.span_id(), "late", CheckStatus::Fail, None);
        let second = session.finalize();
        assert_eq!(first, second);
        assert_eq!(second.status(), CheckStatus::Warn);
    }
}
