//! Weighted compression of the recent history window
//!
//! Each recent message gets a character budget proportional to a weight that
//! grows with recency, favours user turns and bumps the last two entries.
//! The newest message is kept verbatim so the model always sees the literal
//! latest turn.

use super::message::{Message, Role};
use super::pressure::round_clamped;
use super::text::compact_message_text;

/// Per-message character caps derived from pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCaps {
    /// Smallest budget any pooled message is given
    pub min: usize,
    /// Largest budget any pooled message is given
    pub max: usize,
}

impl MessageCaps {
    /// Caps for the given pressure: `[240, 2200]` when relaxed, `[130, 900]`
    /// at full pressure
    #[must_use]
    pub fn for_pressure(pressure: f64) -> Self {
        Self {
            max: round_clamped(2200.0 - 1300.0 * pressure, 480, 2200),
            min: round_clamped(240.0 - 110.0 * pressure, 120, 240),
        }
    }

    /// Floor used when squeezing overflow out of an older pooled message
    const fn overflow_floor(self, newest: bool) -> usize {
        if newest {
            self.min
        } else {
            let relaxed = self.min.saturating_sub(40);
            if relaxed > 90 { relaxed } else { 90 }
        }
    }
}

/// Allocation weight for the pooled message at `index` of `count`
fn allocation_weight(index: usize, count: usize, role: Role) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let recency = index as f64 / count.saturating_sub(1).max(1) as f64;

    // unfused: rounding must match a plain `1.0 + 0.9 * r`
    #[allow(clippy::suboptimal_flops)]
    let mut weight = 1.0 + 0.9 * recency;
    match role {
        Role::User => weight += 0.25,
        Role::System => weight += 0.1,
        Role::Assistant => {}
    }
    if index + 2 >= count {
        weight += 0.2;
    }
    weight
}

/// Compress the recent window into roughly `total_budget` characters
///
/// With `preserve_last`, the final message is trimmed and appended untouched
/// and does not take part in the weighting. The rest (the pool) is budgeted
/// between [`MessageCaps::min`] and [`MessageCaps::max`] each; any overflow
/// left after compaction is squeezed out of the oldest entries first.
#[must_use]
pub fn compress_recent(
    messages: &[Message],
    total_budget: usize,
    pressure: f64,
    preserve_last: bool,
) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let caps = MessageCaps::for_pressure(pressure);

    let (pool, tail) = match messages.split_last() {
        Some((last, rest)) if preserve_last && !last.text.trim().is_empty() => {
            (rest, Some(Message::new(last.role, last.text.trim())))
        }
        _ => (messages, None),
    };
    let tail_len = tail.as_ref().map_or(0, Message::char_len);

    if pool.is_empty() {
        return tail.into_iter().collect();
    }

    let count = pool.len();
    let effective_budget = total_budget.clamp(
        count * caps.min + tail_len,
        count * caps.max + tail_len,
    );
    let available = (effective_budget - tail_len).max(count * caps.min);

    let weights: Vec<f64> = pool
        .iter()
        .enumerate()
        .map(|(index, message)| allocation_weight(index, count, message.role))
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    #[allow(clippy::cast_precision_loss)]
    let budgets: Vec<usize> = weights
        .iter()
        .map(|weight| round_clamped(available as f64 * (weight / weight_sum), caps.min, caps.max))
        .collect();

    tracing::trace!(?budgets, available, effective_budget, tail_len, "recent message budgets");

    let mut compressed: Vec<Message> = pool
        .iter()
        .zip(&budgets)
        .filter_map(|(message, &budget)| {
            let text = compact_message_text(&message.text, budget);
            (!text.is_empty()).then(|| Message::new(message.role, text))
        })
        .collect();

    let current_total: usize = compressed.iter().map(Message::char_len).sum::<usize>() + tail_len;
    let overflow = current_total.saturating_sub(effective_budget);
    if overflow > 0 {
        squeeze_overflow(&mut compressed, overflow, caps);
    }

    compressed.extend(tail);
    compressed
}

/// Shrink pooled messages oldest-first until `overflow` characters are gone
/// or nothing is reducible
fn squeeze_overflow(compressed: &mut [Message], mut overflow: usize, caps: MessageCaps) {
    let count = compressed.len();
    for (index, message) in compressed.iter_mut().enumerate() {
        if overflow == 0 {
            break;
        }

        let current_len = message.char_len();
        let floor = caps.overflow_floor(index + 2 >= count);
        let reducible = current_len.saturating_sub(floor);
        if reducible == 0 {
            continue;
        }

        let target = current_len - reducible.min(overflow);
        let reduced = compact_message_text(&message.text, target);
        overflow = overflow.saturating_sub(current_len - reduced.chars().count());
        message.text = reduced;
    }

    if overflow > 0 {
        tracing::debug!(overflow, "recent history still over budget after squeezing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_alternating(n: usize, len: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                let text = "x".repeat(len);
                if i % 2 == 0 { Message::user(text) } else { Message::assistant(text) }
            })
            .collect()
    }

    #[test]
    fn caps_follow_pressure() {
        assert_eq!(MessageCaps::for_pressure(0.0), MessageCaps { min: 240, max: 2200 });
        assert_eq!(MessageCaps::for_pressure(1.0), MessageCaps { min: 130, max: 900 });
    }

    #[test]
    fn overflow_floor_is_relaxed_for_older_entries() {
        let caps = MessageCaps { min: 240, max: 2200 };
        assert_eq!(caps.overflow_floor(true), 240);
        assert_eq!(caps.overflow_floor(false), 200);
        let tight = MessageCaps { min: 120, max: 480 };
        assert_eq!(tight.overflow_floor(false), 90);
    }

    #[test]
    fn weights_grow_with_recency_and_favour_users() {
        let first = allocation_weight(0, 10, Role::Assistant);
        let middle = allocation_weight(5, 10, Role::Assistant);
        assert!(middle > first);
        assert!((first - 1.0).abs() < 1e-12);
        assert!((allocation_weight(0, 10, Role::User) - 1.25).abs() < 1e-12);
        assert!((allocation_weight(0, 10, Role::System) - 1.1).abs() < 1e-12);
        // last entry: 1.0 + 0.9 + 0.2
        assert!((allocation_weight(9, 10, Role::Assistant) - 2.1).abs() < 1e-12);
        // single entry counts as newest
        assert!((allocation_weight(0, 1, Role::Assistant) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn half_character_budgets_round_up() {
        // pool of 11 with users at odd indices: index 8 gets 3300 * 1.72 / 17.6 = 322.5
        let mut messages: Vec<Message> = (0..11)
            .map(|i| {
                let text = "x".repeat(3000);
                if i % 2 == 1 { Message::user(text) } else { Message::assistant(text) }
            })
            .collect();
        messages.push(Message::user("0123456789"));

        let out = compress_recent(&messages, 3310, 0.0, true);

        assert_eq!(out.len(), 12);
        assert_eq!(out[8].char_len(), 323);
        assert_eq!(out[9].char_len(), 424);
        assert_eq!(out[10].char_len(), 394);
        assert_eq!(out[11].text, "0123456789");
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(compress_recent(&[], 5000, 0.0, true).is_empty());
    }

    #[test]
    fn single_message_is_preserved_trimmed() {
        let out = compress_recent(&[Message::user("  hello there \n")], 5000, 0.0, true);
        assert_eq!(out, vec![Message::user("hello there")]);
    }

    #[test]
    fn last_message_is_kept_verbatim() {
        let mut messages = long_alternating(9, 3000);
        let latest = format!("  {}  ", "final words ".repeat(400));
        messages.push(Message::user(latest.clone()));

        let out = compress_recent(&messages, 5580, 0.0, true);

        assert_eq!(out.len(), 10);
        assert_eq!(out.last().unwrap().text, latest.trim());
    }

    #[test]
    fn without_preservation_the_last_message_is_compacted() {
        let messages = long_alternating(3, 5000);
        let out = compress_recent(&messages, 3000, 0.0, false);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|m| m.char_len() <= 2200));
    }

    #[test]
    fn pool_lengths_stay_within_caps() {
        let mut messages = long_alternating(13, 3000);
        messages.push(Message::user("final question?"));

        let out = compress_recent(&messages, 5580, 0.0, true);
        let caps = MessageCaps::for_pressure(0.0);
        let pool_total: usize = out[..out.len() - 1].iter().map(Message::char_len).sum();

        assert_eq!(out.len(), 14);
        assert!(pool_total >= 13 * caps.min);
        assert!(pool_total <= 13 * caps.max);
        assert!(pool_total + "final question?".len() <= 5580);
    }

    #[test]
    fn newer_messages_get_larger_budgets() {
        let messages = long_alternating(10, 3000);
        let out = compress_recent(&messages, 6000, 0.0, false);
        assert!(out[0].char_len() < out[8].char_len());
    }

    #[test]
    fn overflow_is_squeezed_from_older_entries() {
        // Budget pinned at the lower clamp forces min-capped entries to overflow
        let mut messages = long_alternating(12, 3000);
        messages.push(Message::user("tail"));

        let out = compress_recent(&messages, 0, 0.0, true);
        let total: usize = out.iter().map(Message::char_len).sum();

        assert!(total <= 12 * 240 + 4);
        assert_eq!(out.last().unwrap().text, "tail");
        assert!(out[0].char_len() < out[11].char_len());
    }

    #[test]
    fn short_messages_pass_through() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("how are you?"),
        ];
        let out = compress_recent(&messages, 5000, 0.5, true);
        assert_eq!(out, messages);
    }

    #[test]
    fn output_is_deterministic() {
        let mut messages = long_alternating(8, 1500);
        messages.push(Message::assistant("done"));
        let first = compress_recent(&messages, 4000, 0.3, true);
        let second = compress_recent(&messages, 4000, 0.3, true);
        assert_eq!(first, second);
    }
}
