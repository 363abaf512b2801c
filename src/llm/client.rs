//! HTTP completion client for OpenAI-compatible endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;

use super::sse::{EventStream, decode_stream};
use super::usage::Usage;
use super::{CompletionClient, CompletionRequest, FinishReason, StreamEvent};
use crate::{Error, Result};

/// Base URL used when none is configured
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("context-press/", env!("CARGO_PKG_VERSION"));

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Most characters of an error body quoted in an error message
const ERROR_BODY_PREVIEW_CHARS: usize = 500;

/// Connection settings for [`HttpCompletionClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_key: String,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl ClientOptions {
    /// Options with the default base URL, user agent and timeout
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the base URL (the part before `/chat/completions`)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Override the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Completion client speaking the `/chat/completions` protocol over HTTP
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(options: ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", options.base_url.trim_end_matches('/')),
            api_key: options.api_key,
        })
    }

    #[cfg(test)]
    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Message for a rejected request: the JSON `error.message` when present,
/// otherwise the status line plus a preview of the body
fn rejection_message(status: u16, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|payload| {
        payload
            .get("error")?
            .get("message")?
            .as_str()
            .filter(|message| !message.trim().is_empty())
            .map(String::from)
    });
    if let Some(message) = from_json {
        return message;
    }

    let fallback = format!("completion request failed with status {status}.");
    if body.trim().is_empty() {
        return fallback;
    }
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
    format!("{fallback} {preview}")
}

/// Events for a non-streamed response body
fn response_events(payload: &Value) -> Result<Vec<StreamEvent>> {
    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Completion("completion service returned no completion choices.".into()))?;

    let content = choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .ok_or(Error::EmptyResponse)?;

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map_or_else(FinishReason::default, FinishReason::from_provider);

    let mut events = vec![
        StreamEvent::Token(content.to_string()),
        StreamEvent::Finish(finish_reason),
    ];
    if let Some(usage) = payload.get("usage").and_then(Usage::from_value) {
        events.push(StreamEvent::Usage(usage));
    }
    Ok(events)
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream> {
        let accept = if request.stream {
            "text/event-stream"
        } else {
            "application/json"
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, accept)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Completion(format!("failed to reach completion service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read rejected response body");
                    String::new()
                }
            };
            tracing::warn!(status = status.as_u16(), "completion request rejected");
            return Err(Error::Completion(rejection_message(status.as_u16(), &body)));
        }

        if request.stream {
            return Ok(decode_stream(response.bytes_stream()));
        }

        let payload: Value = response.json().await?;
        let events = response_events(&payload)?;
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}
