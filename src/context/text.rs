//! Text compaction primitives
//!
//! All lengths are measured in characters (Unicode scalar values), never
//! bytes, so multi-byte text is never split mid-character. Every function is
//! idempotent at a fixed budget: compacting already compacted output again
//! returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;

/// Marker appended by [`compact_text`] when it cuts text short
pub const ELLIPSIS: char = '\u{2026}';

/// Separator placed between the head and tail kept by [`compact_with_head_tail`]
const HEAD_TAIL_SEPARATOR: &str = "\n...\n";

/// Lines worth keeping when a message has to shrink: code, lists, failures and
/// requirements
static SIGNAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(```|`[^`]+`|^\s*[-*]\s+|^\s*\d+[.)]\s+|error|exception|traceback|failed|must|required|todo|fix|bug|[{}\[\]();=<>])",
    )
    .expect("valid regex")
});

/// Number of characters in `s`
#[must_use]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The first `n` characters of `s`
fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// The last `n` characters of `s`
fn tail_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if n >= len {
        return s;
    }
    match s.char_indices().nth(len - n) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

/// Collapse whitespace and cut to `max_chars`, ending with an ellipsis when cut
///
/// Budgets of one or two characters are hard cuts with no ellipsis.
#[must_use]
pub fn compact_text(value: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }

    let compact = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if char_len(&compact) <= max_chars {
        return compact;
    }

    if max_chars <= 2 {
        return head_chars(&compact, max_chars).trim_end().to_string();
    }

    let mut cut = head_chars(&compact, max_chars - 1).trim_end().to_string();
    cut.push(ELLIPSIS);
    cut
}

/// Keep roughly the first 62% and the last part of `value`, joined by `...`
///
/// Falls back to [`compact_text`] when the joined result still exceeds the
/// budget, and to a hard cut for budgets of seven characters or fewer.
#[must_use]
pub fn compact_with_head_tail(value: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if char_len(value) <= max_chars {
        return value.to_string();
    }
    if max_chars <= 7 {
        return head_chars(value, max_chars).trim_end().to_string();
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let head_budget = ((max_chars as f64 * 0.62).floor() as usize).max(1);
    let tail_budget = max_chars.saturating_sub(head_budget + 5).max(1);

    let compacted = format!(
        "{}{HEAD_TAIL_SEPARATOR}{}",
        head_chars(value, head_budget).trim_end(),
        tail_chars(value, tail_budget).trim_start()
    );
    if char_len(&compacted) <= max_chars {
        return compacted;
    }

    compact_text(&compacted, max_chars)
}

/// Whether a line carries code, list structure, failures or requirements
#[must_use]
pub fn is_signal_line(line: &str) -> bool {
    !line.is_empty() && SIGNAL_LINE.is_match(line)
}

/// Shrink a multi-line message, favouring its edges and its signal lines
///
/// Lines are trimmed and blank lines dropped first. If that is not enough,
/// the first line, the last line and every [signal line](is_signal_line) are
/// kept (deduplicated, in order) and squeezed with
/// [`compact_with_head_tail`].
#[must_use]
pub fn compact_message_text(value: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }

    let unified = value.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return String::new();
    }

    let normalized = lines.join("\n");
    if char_len(&normalized) <= max_chars {
        return normalized;
    }

    let last = lines.len() - 1;
    let mut selected: Vec<&str> = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        let is_edge = index == 0 || index == last;
        if !(is_edge || is_signal_line(line)) {
            continue;
        }
        if selected.contains(line) {
            continue;
        }
        selected.push(line);
    }

    let candidate = selected.join("\n");
    let candidate = candidate.trim();
    if !candidate.is_empty() {
        let compacted = compact_with_head_tail(candidate, max_chars);
        if char_len(&compacted) <= max_chars {
            return compacted;
        }
    }

    compact_with_head_tail(&normalized, max_chars)
}
