//! Live progress output while checks are running
//!
//! A placeholder line is printed when a check starts. On an interactive
//! terminal the same line is rewritten in place once the check resolves,
//! provided nothing else was printed in between; otherwise the resolved line is
//! appended below.

use std::io::{self, IsTerminal, Write};

use crossterm::{
    cursor::MoveToPreviousLine,
    queue,
    terminal::{Clear, ClearType},
};

use super::check::CheckStatus;
use super::span::SpanId;

/// Destination for live output
pub enum Sink {
    /// Drop everything, used for structured output
    Discard,
    /// Write lines to `out`; in-place updates only when `interactive`
    Writer {
        out: Box<dyn Write + Send>,
        interactive: bool,
    },
}

impl Sink {
    pub fn discard() -> Self {
        Sink::Discard
    }

    /// Standard output, interactive when attached to a terminal
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        Sink::Writer {
            out: Box::new(io::stdout()),
            interactive,
        }
    }

    pub fn writer(out: impl Write + Send + 'static, interactive: bool) -> Self {
        Sink::Writer {
            out: Box::new(out),
            interactive,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            Sink::Writer {
                interactive: true,
                ..
            }
        )
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Discard => f.write_str("Sink::Discard"),
            Sink::Writer { interactive, .. } => f
                .debug_struct("Sink::Writer")
                .field("interactive", interactive)
                .finish_non_exhaustive(),
        }
    }
}

/// Writes one line per span event to a [`Sink`]
#[derive(Debug)]
pub struct LiveWriter {
    sink: Sink,
    /// Span whose placeholder is the last line printed
    pending: Option<SpanId>,
}

impl LiveWriter {
    pub fn new(sink: Sink) -> Self {
        Self {
            sink,
            pending: None,
        }
    }

    /// Prints the placeholder line for a span that just started
    pub fn started(&mut self, id: SpanId, depth: usize, name: &str) -> io::Result<()> {
        let Sink::Writer { out, .. } = &mut self.sink else {
            return Ok(());
        };
        writeln!(out, "{}", line(depth, CheckStatus::Unknown, name))?;
        out.flush()?;
        self.pending = Some(id);
        Ok(())
    }

    /// Prints the resolved line for a span, in place when possible
    pub fn finished(
        &mut self,
        id: SpanId,
        depth: usize,
        name: &str,
        status: CheckStatus,
    ) -> io::Result<()> {
        let pending = self.pending.take();
        let Sink::Writer { out, interactive } = &mut self.sink else {
            return Ok(());
        };
        if *interactive && pending == Some(id) {
            queue!(out, MoveToPreviousLine(1), Clear(ClearType::CurrentLine))?;
        }
        writeln!(out, "{}", line(depth, status, name))?;
        out.flush()
    }
}

fn line(depth: usize, status: CheckStatus, name: &str) -> String {
    format!("{}{} {}", "  ".repeat(depth), status.as_colored_str(), name)
}
