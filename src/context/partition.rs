//! Older/recent history split

use super::message::Message;

/// History split into a summarized part and a near-verbatim part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition<'a> {
    /// Messages older than the window, folded into the digest
    pub older: &'a [Message],
    /// The last `window` messages
    pub recent: &'a [Message],
}

impl Partition<'_> {
    /// Whether anything falls outside the window
    #[must_use]
    pub const fn has_older(&self) -> bool {
        !self.older.is_empty()
    }
}

/// Split `history` so that the last `window` messages are recent
///
/// When the whole history fits in the window there is no older segment.
#[must_use]
pub fn partition_history(history: &[Message], window: usize) -> Partition<'_> {
    if history.len() <= window {
        return Partition {
            older: &[],
            recent: history,
        };
    }

    let (older, recent) = history.split_at(history.len() - window);
    Partition { older, recent }
}
