//! Error types for context-press

use thiserror::Error;

/// Result type alias for context-press operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the collaborators around the compression engine
///
/// The engine itself never fails; these cover configuration, the completion
/// service and the conversation store.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Completion service reported a failure
    #[error("{0}")]
    Completion(String),

    /// Completion service answered without any assistant text
    #[error("completion service returned an empty assistant response")]
    EmptyResponse,

    /// Conversation store error
    #[error("store error: {0}")]
    Store(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
