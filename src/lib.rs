//! context-press - budgeted conversation context for chat completion CLIs
//!
//! This library provides:
//! - Context compression (rule-based digest of older turns, weighted
//!   truncation of the recent window)
//! - A streaming client for OpenAI-compatible chat completion endpoints
//! - Conversation bundle persistence
//! - JSON-lines progress events
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   records   ┌──────────────────────────────┐
//! │    store     │ ──────────▶ │           context            │
//! │  (bundles)   │             │ partition → digest + recency │
//! └──────────────┘             └──────────────┬───────────────┘
//!                                             │ messages
//! ┌──────────────┐    events   ┌──────────────▼───────────────┐
//! │    events    │ ◀────────── │             llm              │
//! │ (JSON lines) │             │  request → SSE → completion  │
//! └──────────────┘             └──────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod llm;
pub mod store;

pub use config::Config;
pub use context::{CompressedContext, CompressionConfig, ContextBuilder, Message, Role};
pub use error::{Error, Result};
pub use events::{Event, EventWriter};
pub use llm::{
    Completion, CompletionClient, CompletionRequest, FinishReason, HttpCompletionClient,
    StreamEvent, Usage,
};
pub use store::ConversationBundle;
