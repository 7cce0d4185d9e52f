//! Span tree: one node per declared check
//!
//! Spans live in an arena owned by the session. Parents refer to children by
//! [`SpanId`], so carriers can point at a span without owning it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::check::{CheckResult, CheckStatus, rollup};

/// Message recorded on spans that were still open when results were finalized
pub const INCOMPLETE_MESSAGE: &str = "check did not complete before results were finalized";

/// Index of a span inside its session's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(usize);

impl SpanId {
    pub(crate) const ROOT: SpanId = SpanId(0);
}

/// One node of the check tree
#[derive(Debug)]
pub struct Span {
    pub name: String,
    /// Directly assigned status; `Unknown` until something assigns one
    pub status: CheckStatus,
    pub messages: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    pub duration: Option<Duration>,
    pub children: Vec<SpanId>,
    pub parent: Option<SpanId>,
    pub ended: bool,
}

impl Span {
    fn new(name: String, parent: Option<SpanId>) -> Self {
        Self {
            name,
            status: CheckStatus::Unknown,
            messages: Vec::new(),
            started_at: None,
            started: None,
            duration: None,
            children: Vec::new(),
            parent,
            ended: false,
        }
    }

    fn start_clock(&mut self) {
        self.started_at = Some(Utc::now());
        self.started = Some(Instant::now());
    }
}

/// Arena of spans rooted at [`SpanId::ROOT`]
#[derive(Debug)]
pub struct SpanTree {
    spans: Vec<Span>,
}

impl SpanTree {
    /// Creates a tree holding only a started root span
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut root = Span::new(root_name.into(), None);
        root.start_clock();
        Self { spans: vec![root] }
    }

    pub fn get(&self, id: SpanId) -> &Span {
        &self.spans[id.0]
    }

    fn get_mut(&mut self, id: SpanId) -> &mut Span {
        &mut self.spans[id.0]
    }

    /// Number of ancestors between `id` and the root
    pub fn depth(&self, id: SpanId) -> usize {
        std::iter::successors(self.get(id).parent, |p| self.get(*p).parent).count()
    }

    /// Appends a running child under `parent` and starts its clock
    pub fn start_child(&mut self, parent: SpanId, name: impl Into<String>) -> SpanId {
        let id = self.push_child(parent, name.into());
        self.get_mut(id).start_clock();
        id
    }

    /// Appends an already-ended leaf under `parent`
    ///
    /// Skipped leaves carry no timestamps; every other leaf gets a zero-length
    /// duration at the current time.
    pub fn add_leaf(
        &mut self,
        parent: SpanId,
        name: impl Into<String>,
        status: CheckStatus,
        message: Option<String>,
    ) -> SpanId {
        let id = self.push_child(parent, name.into());
        let span = self.get_mut(id);
        if status != CheckStatus::Skipped {
            span.started_at = Some(Utc::now());
            span.duration = Some(Duration::ZERO);
        }
        span.status = status;
        span.messages.extend(message.filter(|m| !m.is_empty()));
        span.ended = true;
        id
    }

    fn push_child(&mut self, parent: SpanId, name: String) -> SpanId {
        let id = SpanId(self.spans.len());
        self.spans.push(Span::new(name, Some(parent)));
        self.get_mut(parent).children.push(id);
        id
    }

    /// Merges `status` into the span's direct status and records the message
    pub fn assign(&mut self, id: SpanId, status: CheckStatus, message: Option<String>) {
        let span = self.get_mut(id);
        span.status = span.status.worst(status);
        span.messages.extend(message.filter(|m| !m.is_empty()));
    }

    /// Closes a span, recording its duration; closing twice keeps the first
    pub fn end(&mut self, id: SpanId) {
        let span = self.get_mut(id);
        if span.ended {
            return;
        }
        span.duration = span.started.map(|s| s.elapsed());
        span.ended = true;
    }

    /// Effective status of the subtree at `id` as currently recorded
    pub fn effective(&self, id: SpanId) -> CheckStatus {
        let span = self.get(id);
        let direct = if span.ended { span.status } else { CheckStatus::Fail };
        rollup(direct, span.children.iter().map(|c| self.effective(*c)))
    }

    /// Post-order snapshot of the subtree at `id`
    ///
    /// Spans that are still open resolve to `Fail`, so `Unknown` never
    /// escapes into a snapshot.
    pub fn snapshot(&self, id: SpanId) -> CheckResult {
        let span = self.get(id);
        let children: Vec<CheckResult> = span.children.iter().map(|c| self.snapshot(*c)).collect();

        let mut messages = span.messages.clone();
        let mut direct = span.status;
        if !span.ended {
            direct = CheckStatus::Fail;
            messages.push(INCOMPLETE_MESSAGE.to_string());
        }

        CheckResult {
            name: span.name.clone(),
            status: rollup(direct, children.iter().map(|c| c.status)),
            messages,
            started_at: span.started_at,
            duration: span.duration,
            children,
        }
    }
}
