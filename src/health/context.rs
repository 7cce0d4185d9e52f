//! Carrier for the currently active span

use std::sync::{Arc, Weak};

use super::session::SessionInner;
use super::span::SpanId;

/// Handle identifying the span new checks attach under
///
/// Each nested check receives a fresh `Ctx` pointing at its own span, so
/// helpers deep in a call graph record results in the right place without a
/// tree handle being passed around. The carrier only holds a weak reference:
/// once the session is dropped every operation through it is a no-op.
#[derive(Debug, Clone)]
pub struct Ctx {
    session: Weak<SessionInner>,
    span: SpanId,
}

impl Ctx {
    pub(crate) fn new(session: Weak<SessionInner>, span: SpanId) -> Self {
        Self { session, span }
    }

    /// Span that children created through this carrier attach under
    pub fn span_id(&self) -> SpanId {
        self.span
    }

    /// Whether a check called `name` would be bypassed in this session
    pub fn is_skipped(&self, name: &str) -> bool {
        self.session().is_some_and(|s| s.is_skipped(name))
    }

    pub(crate) fn session(&self) -> Option<Arc<SessionInner>> {
        self.session.upgrade()
    }

    /// Carrier for a child span of the same session
    pub(crate) fn derive(&self, span: SpanId) -> Ctx {
        Ctx {
            session: self.session.clone(),
            span,
        }
    }
}
