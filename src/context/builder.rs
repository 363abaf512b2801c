//! Context assembly
//!
//! Glues the pipeline together: normalize the stored records, split them at
//! the history window, digest the older part, compress the recent part and
//! put the system prompt in front.

use serde::Serialize;
use serde_json::Value;

use super::message::{Message, Role, normalize_history};
use super::partition::partition_history;
use super::pressure::{
    DEFAULT_HISTORY_WINDOW, DEFAULT_SUMMARY_MAX_CHARS, clamp_budget, compression_pressure,
    recent_history_budget,
};
use super::recency::compress_recent;
use super::summary::summarize_history;

/// Smallest accepted digest budget
pub const MIN_SUMMARY_MAX_CHARS: usize = 240;

/// Prefix of the system message carrying the digest of older turns
pub const SUMMARY_HEADER: &str =
    "Conversation summary for earlier turns (compressed for efficiency):\n";

/// Configuration for context compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressionConfig {
    /// Number of most recent messages kept near-verbatim
    pub history_window_messages: usize,
    /// Character budget for the digest of older turns
    pub summary_max_chars: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            history_window_messages: DEFAULT_HISTORY_WINDOW,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }
}

impl CompressionConfig {
    /// Raise both limits to their safe minimums
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            history_window_messages: self.history_window_messages.max(1),
            summary_max_chars: self.summary_max_chars.max(MIN_SUMMARY_MAX_CHARS),
        }
    }
}

/// Bookkeeping about one compression run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ContextStats {
    /// Messages that fell outside the window and went into the digest
    pub summarized_messages: usize,
    /// Messages kept (compressed) from the recent window
    pub preserved_messages: usize,
    /// Records dropped as malformed
    pub dropped_records: usize,
    /// Pressure the run was compressed under
    pub pressure: f64,
    /// Character budget handed to the recent window
    pub recent_budget: usize,
}

/// Message list ready to send to a completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedContext {
    messages: Vec<Message>,
    stats: ContextStats,
}

impl CompressedContext {
    /// The assembled messages, system prompt first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the context, keeping only the messages
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Statistics of the run that produced this context
    #[must_use]
    pub const fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// Total characters across all messages
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }

    /// Make sure the context ends with `message` as a user turn
    ///
    /// Blank input is ignored, as is a message already present as the final
    /// user turn (compared trimmed).
    pub fn ensure_latest_user_message(&mut self, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }

        let already_last = self
            .messages
            .last()
            .is_some_and(|last| last.role == Role::User && last.text.trim() == message);
        if !already_last {
            self.messages.push(Message::user(message));
        }
    }
}

/// Builds compressed contexts from stored conversation records
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder {
    config: CompressionConfig,
}

impl ContextBuilder {
    /// Create a builder; the config is clamped to its safe minimums
    #[must_use]
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config: config.clamped(),
        }
    }

    /// The effective (clamped) configuration
    #[must_use]
    pub const fn config(&self) -> CompressionConfig {
        self.config
    }

    /// Assemble `[system prompt, digest?, ...recent]` from raw records
    ///
    /// Never fails: malformed records are dropped and an empty history yields
    /// just the system prompt.
    #[must_use]
    pub fn build(&self, system_prompt: &str, records: &[Value]) -> CompressedContext {
        let CompressionConfig {
            history_window_messages: window,
            summary_max_chars: summary_limit,
        } = self.config;

        let history = normalize_history(records);
        let pressure = compression_pressure(window, summary_limit);
        let recent_budget = recent_history_budget(window, summary_limit, pressure);

        let mut messages = vec![Message::system(system_prompt)];
        let mut stats = ContextStats {
            dropped_records: records.len() - history.len(),
            pressure,
            recent_budget,
            ..ContextStats::default()
        };

        let split = partition_history(&history, window);
        let recent = if split.has_older() {
            let digest = summarize_history(split.older, summary_limit);
            if !digest.is_empty() {
                messages.push(Message::system(format!("{SUMMARY_HEADER}{digest}")));
            }
            stats.summarized_messages = split.older.len();
            compress_recent(split.recent, recent_budget, pressure, true)
        } else {
            let budget = clamp_budget(
                i64::try_from(recent_budget).unwrap_or(i64::MAX),
                split.recent.len(),
            );
            stats.recent_budget = budget;
            compress_recent(split.recent, budget, pressure, true)
        };

        stats.preserved_messages = recent.len();
        messages.extend(recent);

        let context = CompressedContext { messages, stats };
        tracing::debug!(
            window,
            summary_limit,
            pressure,
            recent_budget = stats.recent_budget,
            summarized = stats.summarized_messages,
            preserved = stats.preserved_messages,
            dropped = stats.dropped_records,
            total_chars = context.total_chars(),
            "built compressed context"
        );

        context
    }
}
