//! Chat completion collaborator
//!
//! The compression engine only produces a message list; this module sends it
//! to an OpenAI-compatible `/chat/completions` endpoint and turns the answer
//! into a uniform stream of [`StreamEvent`]s, whether the response was
//! streamed or not.

mod client;
pub mod sse;
mod usage;

use std::fmt;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Serialize;

pub use client::{ClientOptions, DEFAULT_API_BASE_URL, DEFAULT_USER_AGENT, HttpCompletionClient};
pub use sse::{EventStream, SseDecoder, decode_stream};
pub use usage::Usage;

use crate::context::Message;
use crate::{Error, Result};

/// Body of a chat completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_models: Vec<String>,
}

impl CompletionRequest {
    /// Create a streaming request with no token limit
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            max_tokens: None,
            available_models: Vec::new(),
        }
    }

    /// Toggle streaming
    #[must_use]
    pub const fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Cap the completion length; zero means no cap
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens.filter(|n| *n > 0);
        self
    }

    /// Models the endpoint may route between
    #[must_use]
    pub fn with_available_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }
}

/// Why a completion stopped, normalized to kebab-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FinishReason(String);

impl FinishReason {
    /// Normalize a provider finish reason
    ///
    /// `content_filter` and `tool_calls` become `content-filter` and
    /// `tool-calls`; anything else is kept as is.
    #[must_use]
    pub fn from_provider(reason: &str) -> Self {
        let normalized = match reason {
            "content_filter" => "content-filter",
            "tool_calls" => "tool-calls",
            other => other,
        };
        Self(normalized.to_string())
    }

    /// The normalized reason
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FinishReason {
    fn default() -> Self {
        Self("stop".to_string())
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One event of a completion stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of assistant text
    Token(String),
    /// The provider reported why generation stopped
    Finish(FinishReason),
    /// Token accounting
    Usage(Usage),
}

/// A finished completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

/// Fold state for a completion stream
///
/// Tokens are concatenated, the last finish reason wins and the first usage
/// report wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamAccumulator {
    text: String,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    /// Fold one event into the accumulator
    #[must_use]
    pub fn apply(mut self, event: StreamEvent) -> Self {
        match event {
            StreamEvent::Token(token) => self.text.push_str(&token),
            StreamEvent::Finish(reason) => self.finish_reason = Some(reason),
            StreamEvent::Usage(usage) => {
                self.usage.get_or_insert(usage);
            }
        }
        self
    }

    /// Finish the fold
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyResponse`] when no non-blank text was streamed
    pub fn into_completion(self) -> Result<Completion> {
        if self.text.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(Completion {
            text: self.text,
            finish_reason: self.finish_reason.unwrap_or_default(),
            usage: self.usage,
        })
    }
}

/// A chat completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a completion and return its event stream
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or is rejected
    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream>;

    /// Run a completion to the end, calling `observer` for every event
    ///
    /// # Errors
    ///
    /// Returns the first stream error, or [`Error::EmptyResponse`]
    async fn complete_with(
        &self,
        request: &CompletionRequest,
        observer: &mut (dyn for<'e> FnMut(&'e StreamEvent) + Send),
    ) -> Result<Completion> {
        let events = self.stream(request).await?;
        let accumulator = events
            .try_fold(StreamAccumulator::default(), |accumulator, event| {
                observer(&event);
                futures::future::ready(Ok(accumulator.apply(event)))
            })
            .await?;

        let completion = accumulator.into_completion()?;
        tracing::debug!(
            model = %request.model,
            chars = completion.text.chars().count(),
            finish_reason = %completion.finish_reason,
            "completion finished"
        );
        Ok(completion)
    }

    /// Run a completion to the end
    ///
    /// # Errors
    ///
    /// Returns the first stream error, or [`Error::EmptyResponse`]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.complete_with(request, &mut |_| {}).await
    }
}
