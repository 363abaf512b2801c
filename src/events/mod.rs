//! JSON-lines progress events
//!
//! The CLI reports everything it does as one JSON object per line on stdout
//! so a host application can follow a completion as it streams. Each line is
//! flushed as soon as it is written.

use std::io::Write;

use serde::Serialize;

use crate::Result;
use crate::llm::{FinishReason, Usage};

/// One line of output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// A streamed piece of assistant text
    Token { token: String },
    /// Token accounting for the completion
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    /// The complete assistant answer
    Final {
        text: String,
        finish_reason: FinishReason,
    },
    /// A failure, reported instead of a final answer
    Error { message: String },
}

impl Event {
    /// Token event
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token { token: token.into() }
    }

    /// Error event
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl From<Usage> for Event {
    fn from(usage: Usage) -> Self {
        Self::Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Writes [`Event`]s as JSON lines
#[derive(Debug)]
pub struct EventWriter<W: Write> {
    out: W,
}

impl<W: Write> EventWriter<W> {
    /// Wrap a writer
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one event and flush
    ///
    /// # Errors
    ///
    /// Returns error if the event cannot be written
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    /// Write one event, logging instead of failing
    pub fn emit_or_log(&mut self, event: &Event) {
        if let Err(e) = self.emit(event) {
            tracing::warn!(error = %e, "failed to write event");
        }
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}
