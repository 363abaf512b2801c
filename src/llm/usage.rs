//! Token usage normalization
//!
//! Providers report usage under different keys (`prompt_tokens` or
//! `input_tokens`, ...) and in different numeric shapes. Everything is folded
//! into one [`Usage`] with any missing part derived from the others.

use serde::Serialize;
use serde_json::Value;

use crate::context::round_half_up;

/// Token counts for one completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Read a non-negative integer from an int, a finite float (rounded) or a
/// numeric string; booleans and negatives are rejected
fn non_negative_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => {
            if let Some(count) = number.as_u64() {
                return Some(count);
            }
            if number.is_i64() {
                return None;
            }
            let float = number.as_f64().filter(|f| f.is_finite())?;
            u64::try_from(round_half_up(float)).ok()
        }
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// First present key wins, even when its value is unusable
fn count_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .and_then(non_negative_count)
}

impl Usage {
    /// Normalize a provider usage object
    ///
    /// Returns `None` when `raw` is not an object or carries no usable count.
    #[must_use]
    pub fn from_value(raw: &Value) -> Option<Self> {
        let object = raw.as_object()?;

        let mut prompt = count_field(object, &["prompt_tokens", "input_tokens"]);
        let mut completion = count_field(object, &["completion_tokens", "output_tokens"]);
        let mut total = count_field(object, &["total_tokens"]);

        if total.is_none() {
            if let (Some(p), Some(c)) = (prompt, completion) {
                total = Some(p + c);
            }
        }

        if let Some(t) = total {
            if prompt.is_none() {
                if let Some(c) = completion {
                    prompt = Some(t.saturating_sub(c));
                }
            }
            if completion.is_none() {
                if let Some(p) = prompt {
                    completion = Some(t.saturating_sub(p));
                }
            }
        }

        if prompt.is_none() && completion.is_none() && total.is_none() {
            return None;
        }

        let prompt_tokens = prompt.unwrap_or(0);
        let completion_tokens = completion.unwrap_or(0);
        let total_tokens = total
            .filter(|t| *t > 0)
            .unwrap_or(prompt_tokens + completion_tokens);

        Some(Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        })
    }
}
