//! Message types and history normalization

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Wire name used by stored records and the completion API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Capitalized name used in digest lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }

    /// Parse a stored role name; only the exact lowercase names are accepted
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
///
/// Serializes as `{"role": ..., "content": ...}`, the shape chat completion
/// endpoints expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

impl Message {
    /// Create a message with an arbitrary role
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a system message
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Length of the message text in characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Convert one stored record into a message
    ///
    /// Returns `None` unless the record is an object with a known `role` and a
    /// `text` string that is not blank. The text is kept untrimmed.
    #[must_use]
    pub fn from_record(record: &Value) -> Option<Self> {
        let object = record.as_object()?;
        let role = object.get("role").and_then(Value::as_str).and_then(Role::parse)?;
        let text = object.get("text").and_then(Value::as_str)?;
        if text.trim().is_empty() {
            return None;
        }
        Some(Self::new(role, text))
    }
}

/// Drop malformed records, keeping the valid ones in their original order
#[must_use]
pub fn normalize_history(records: &[Value]) -> Vec<Message> {
    let normalized: Vec<Message> = records.iter().filter_map(Message::from_record).collect();

    let dropped = records.len() - normalized.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = normalized.len(), "dropped malformed history records");
    }

    normalized
}
