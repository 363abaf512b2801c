//! Server-Sent Events decoding for streamed chat completions
//!
//! Two layers:
//! - [`SseDecoder`] turns lines into [`StreamEvent`]s (event framing, chunk
//!   parsing, token extraction)
//! - [`decode_stream`] buffers a chunked byte stream into lines and feeds the
//!   decoder
//!
//! Providers disagree on where streamed text lives, so token extraction is
//! permissive: `delta` first, then `text`, `content` and `message.content`.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::usage::Usage;
use super::{FinishReason, StreamEvent};
use crate::{Error, Result};

/// Keys searched for text inside nested chunk objects
const TEXT_KEYS: [&str; 4] = ["text", "content", "value", "output_text"];

/// Marker that ends a stream
const DONE_MARKER: &str = "[DONE]";

/// Collect text fragments from strings, arrays and objects, recursively
///
/// Objects contribute only their [`TEXT_KEYS`]; empty strings are skipped.
#[must_use]
pub fn text_fragments(value: &Value) -> Vec<String> {
    let mut fragments = Vec::new();
    collect_fragments(value, &mut fragments);
    fragments
}

fn collect_fragments(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) if !text.is_empty() => out.push(text.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_fragments(item, out)),
        Value::Object(object) => {
            for key in TEXT_KEYS {
                if let Some(nested) = object.get(key) {
                    collect_fragments(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Tokens carried by one streamed choice
///
/// Prefers `delta`; falls back to `text`, `content` and `message.content`
/// only when the delta has no text. Immediate duplicates are collapsed.
#[must_use]
pub fn choice_tokens(choice: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut raw = choice.get("delta").map(text_fragments).unwrap_or_default();

    if raw.is_empty() {
        for key in ["text", "content"] {
            if let Some(value) = choice.get(key) {
                raw.extend(text_fragments(value));
            }
        }
        match choice.get("message") {
            Some(Value::Object(message)) => {
                if let Some(content) = message.get("content") {
                    raw.extend(text_fragments(content));
                }
            }
            Some(other) => raw.extend(text_fragments(other)),
            None => {}
        }
    }

    let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
    for fragment in raw {
        if fragment.is_empty() || tokens.last() == Some(&fragment) {
            continue;
        }
        tokens.push(fragment);
    }
    tokens
}

/// Events carried by one decoded JSON chunk
///
/// # Errors
///
/// Returns [`Error::Completion`] when the chunk reports an `error.message`
pub fn chunk_events(chunk: &Value) -> Result<Vec<StreamEvent>> {
    let Some(object) = chunk.as_object() else {
        return Ok(Vec::new());
    };

    let mut events = Vec::new();
    if let Some(usage) = object.get("usage").and_then(Usage::from_value) {
        events.push(StreamEvent::Usage(usage));
    }

    if let Some(message) = object
        .get("error")
        .and_then(Value::as_object)
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
    {
        return Err(Error::Completion(message.to_string()));
    }

    let Some(choices) = object.get("choices").and_then(Value::as_array) else {
        events.extend(text_fragments(chunk).into_iter().map(StreamEvent::Token));
        return Ok(events);
    };

    for choice in choices.iter().filter_map(Value::as_object) {
        events.extend(choice_tokens(choice).into_iter().map(StreamEvent::Token));

        if let Some(usage) = choice.get("usage").and_then(Usage::from_value) {
            events.push(StreamEvent::Usage(usage));
        }

        if let Some(reason) = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
        {
            events.push(StreamEvent::Finish(FinishReason::from_provider(reason)));
        }
    }

    Ok(events)
}

/// Line-fed SSE decoder
///
/// Lines are grouped into events at blank lines. An event's `data:` lines are
/// joined with newlines; an event without any `data:` line is still accepted
/// when it looks like a raw JSON object, which some proxies send even for
/// streamed requests.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<String>,
    done: bool,
}

impl SseDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen; later input is ignored
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one line (without its terminator)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Completion`] when a dispatched chunk reports an error
    pub fn push_line(&mut self, line: &str) -> Result<Vec<StreamEvent>> {
        if self.done {
            return Ok(Vec::new());
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return self.dispatch();
        }
        if !line.starts_with(':') {
            self.pending.push(line.to_string());
        }
        Ok(Vec::new())
    }

    /// Flush any event left without a terminating blank line
    ///
    /// # Errors
    ///
    /// Returns [`Error::Completion`] when the final chunk reports an error
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        if self.done {
            return Ok(Vec::new());
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Result<Vec<StreamEvent>> {
        let lines = std::mem::take(&mut self.pending);
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let data: Vec<&str> = lines
            .iter()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();

        if !data.is_empty() {
            let payload = data.join("\n");
            return self.consume_payload(payload.trim());
        }

        let raw = lines.join("\n");
        let raw = raw.trim();
        if raw.starts_with('{') {
            return self.consume_payload(raw);
        }

        Ok(Vec::new())
    }

    fn consume_payload(&mut self, payload: &str) -> Result<Vec<StreamEvent>> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if payload == DONE_MARKER {
            self.done = true;
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(chunk) => chunk_events(&chunk),
            Err(e) => {
                tracing::trace!(error = %e, "ignoring non-JSON stream payload");
                Ok(Vec::new())
            }
        }
    }
}

/// Stream of decoded events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    buffer: BytesMut,
    decoder: SseDecoder,
    queue: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Pop one complete line off the buffer, if there is one
    fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(newline + 1);
        line.truncate(newline);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn absorb(&mut self, decoded: Result<Vec<StreamEvent>>) -> Result<()> {
        let events = decoded?;
        self.queue.extend(events);
        if self.decoder.is_done() {
            self.finished = true;
        }
        Ok(())
    }
}

/// Decode a chunked SSE byte stream into events
///
/// Ends after `[DONE]`, at the end of the byte stream, or after the first
/// error (which is yielded).
pub fn decode_stream<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        buffer: BytesMut::with_capacity(8192),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    let events = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            if let Some(line) = state.next_line() {
                let decoded = state.decoder.push_line(&line);
                if let Err(e) = state.absorb(decoded) {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                continue;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.finished = true;
                    let rest = String::from_utf8_lossy(&state.buffer).into_owned();
                    state.buffer.clear();

                    let mut decoded = state.decoder.push_line(&rest);
                    if decoded.is_ok() {
                        decoded = state.decoder.finish();
                    }
                    if let Err(e) = state.absorb(decoded) {
                        return Some((Err(e), state));
                    }
                }
            }
        }
    });

    Box::pin(events)
}
