//! Shared test utilities

#![allow(dead_code)]

use serde_json::{Value, json};

/// A stored record as a conversation bundle keeps it
#[must_use]
pub fn record(role: &str, text: &str) -> Value {
    json!({"role": role, "text": text, "timestamp": "2024-05-01T12:00:00+00:00"})
}

/// `n` alternating user/assistant records, numbered from 1
#[must_use]
pub fn alternating_records(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| {
            if i % 2 == 1 {
                record("user", &format!("question {i}"))
            } else {
                record("assistant", &format!("answer {i}"))
            }
        })
        .collect()
}

/// A server-sent events body carrying `chunks` followed by `[DONE]`
#[must_use]
pub fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(&chunk.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// A streamed chunk carrying one content delta
#[must_use]
pub fn delta_chunk(content: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": content}}]})
}
