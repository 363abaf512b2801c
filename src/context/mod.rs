//! Conversation context compression
//!
//! Turns an arbitrarily long stored history into a character-budgeted
//! message list:
//! - older turns are folded into a rule-based digest
//! - the recent window is compressed with per-message weighted budgets
//! - the newest message is kept verbatim
//!
//! Everything here is synchronous and deterministic.

mod builder;
mod message;
mod partition;
mod pressure;
mod recency;
mod summary;
pub mod text;

pub use builder::{
    CompressedContext, CompressionConfig, ContextBuilder, ContextStats, MIN_SUMMARY_MAX_CHARS,
    SUMMARY_HEADER,
};
pub use message::{Message, Role, normalize_history};
pub use partition::{Partition, partition_history};
pub use pressure::{
    DEFAULT_HISTORY_WINDOW, DEFAULT_SUMMARY_MAX_CHARS, clamp_budget, compression_pressure,
    recent_history_budget, round_clamped, round_half_up,
};
pub use recency::{MessageCaps, compress_recent};
pub use summary::summarize_history;
