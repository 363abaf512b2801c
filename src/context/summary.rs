//! Rule-based digest of turns older than the history window
//!
//! No model is involved: the digest is a bulleted list of compacted turns,
//! keeping the earliest one or two turns (which usually state the goal) and
//! as many of the latest older turns as the budget allows.

use super::message::Message;
use super::pressure::round_clamped;
use super::text::{char_len, compact_message_text, compact_text};

/// Fewest turns a digest tries to represent
const MIN_DIGEST_ENTRIES: usize = 4;

/// Most turns a digest tries to represent
const MAX_DIGEST_ENTRIES: usize = 36;

/// Rough characters per digest entry when sizing the entry count
const CHARS_PER_ENTRY: f64 = 120.0;

/// Per-entry character cap range
const MIN_ENTRY_CHARS: usize = 90;
const MAX_ENTRY_CHARS: usize = 260;

/// Pick at most `max_entries` messages: a short head plus the latest tail
fn select_for_digest(messages: &[Message], max_entries: usize) -> Vec<&Message> {
    if messages.len() <= max_entries {
        return messages.iter().collect();
    }

    let max_entries = max_entries.max(1);
    let head_count = (max_entries / 3).clamp(1, 2);
    let tail_count = max_entries - head_count;
    if tail_count == 0 {
        return messages[messages.len() - max_entries..].iter().collect();
    }

    messages[..head_count]
        .iter()
        .chain(&messages[messages.len() - tail_count..])
        .collect()
}

/// Summarize `older` into at most `budget` characters
///
/// Returns an empty string when there is nothing to summarize or no budget.
/// When turns had to be skipped, the digest opens with a line saying how many.
#[must_use]
pub fn summarize_history(older: &[Message], budget: usize) -> String {
    if older.is_empty() || budget == 0 {
        return String::new();
    }

    #[allow(clippy::cast_precision_loss)]
    let max_entries = round_clamped(
        budget as f64 / CHARS_PER_ENTRY,
        MIN_DIGEST_ENTRIES,
        MAX_DIGEST_ENTRIES,
    );
    let selected = select_for_digest(older, max_entries);
    let omitted = older.len() - selected.len();

    #[allow(clippy::cast_precision_loss)]
    let per_message_cap = round_clamped(
        budget as f64 / (selected.len() + 1) as f64,
        MIN_ENTRY_CHARS,
        MAX_ENTRY_CHARS,
    );

    let omitted_line = (omitted > 0)
        .then(|| format!("- [Earlier history compressed: {omitted} turn(s) omitted.]"));
    let entry_lines = selected.iter().filter_map(|message| {
        let text = compact_message_text(&message.text, per_message_cap);
        (!text.is_empty()).then(|| format!("- {}: {text}", message.role.label()))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut remaining = budget;
    for line in omitted_line.into_iter().chain(entry_lines) {
        let cost = char_len(&line) + 1;
        if cost > remaining {
            let cut = compact_text(&line, remaining);
            if !cut.is_empty() {
                lines.push(cut);
            }
            break;
        }

        lines.push(line);
        remaining -= cost;
        if remaining == 0 {
            break;
        }
    }

    let digest = lines.join("\n").trim().to_string();

    tracing::debug!(
        older = older.len(),
        selected = selected.len(),
        omitted,
        per_message_cap,
        digest_chars = char_len(&digest),
        "summarized older history"
    );

    digest
}
