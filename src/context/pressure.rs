//! Compression pressure and recent-history budget
//!
//! Pressure is a `[0, 1]` scalar that rises as the history window or the
//! summary budget shrink below their defaults. Downstream stages use it to
//! tighten per-message caps.

/// Default number of recent messages kept near-verbatim
pub const DEFAULT_HISTORY_WINDOW: usize = 14;

/// Default character budget for the digest of older turns
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 1800;

/// Summary budget at which summary pressure saturates
const SUMMARY_PRESSURE_FLOOR: usize = 400;

/// Round half up
///
/// Every budget in the pipeline goes through this one rule so outputs stay
/// reproducible.
#[must_use]
pub fn round_half_up(value: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let rounded = (value + 0.5).floor() as i64;
    rounded
}

/// Round half up and clamp into `[min, max]`
#[must_use]
pub fn round_clamped(value: f64, min: usize, max: usize) -> usize {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let rounded = round_half_up(value).max(0) as usize;
    rounded.clamp(min, max)
}

/// How aggressively message text should be shrunk for the given budgets
///
/// Zero at (or above) the defaults, approaching one as the window nears a
/// single message and the summary budget nears 400 characters.
#[must_use]
pub fn compression_pressure(history_window: usize, summary_limit: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let window_pressure = DEFAULT_HISTORY_WINDOW.saturating_sub(history_window) as f64
        / DEFAULT_HISTORY_WINDOW.saturating_sub(1).max(1) as f64;

    #[allow(clippy::cast_precision_loss)]
    let summary_pressure = DEFAULT_SUMMARY_MAX_CHARS.saturating_sub(summary_limit) as f64
        / DEFAULT_SUMMARY_MAX_CHARS
            .saturating_sub(SUMMARY_PRESSURE_FLOOR)
            .max(1) as f64;

    (window_pressure * 0.6 + summary_pressure * 0.4).clamp(0.0, 1.0)
}

/// Character budget for the recent (near-verbatim) segment
///
/// Scales with the summary budget and the window relative to its default,
/// is cut further under high pressure, and is clamped to a per-message
/// range of `[170, 2200]` characters across the window.
#[must_use]
pub fn recent_history_budget(history_window: usize, summary_limit: usize, pressure: f64) -> usize {
    #[allow(clippy::cast_precision_loss)]
    let window_ratio = history_window as f64 / DEFAULT_HISTORY_WINDOW.max(1) as f64;

    #[allow(clippy::cast_precision_loss)]
    let mut budget = round_half_up(summary_limit as f64 * (1.75 + 1.35 * window_ratio));
    if pressure >= 0.65 {
        #[allow(clippy::cast_precision_loss)]
        let scaled = round_half_up(budget as f64 * 0.84);
        budget = scaled;
    }
    if pressure >= 0.85 {
        #[allow(clippy::cast_precision_loss)]
        let scaled = round_half_up(budget as f64 * 0.82);
        budget = scaled;
    }

    clamp_budget(budget, history_window)
}

/// Clamp a character budget to `[max(180, n*170), max(2200, n*2200)]`
#[must_use]
pub fn clamp_budget(budget: i64, message_count: usize) -> usize {
    let min = (message_count * 170).max(180);
    let max = (message_count * 2200).max(2200);

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let budget = budget.max(0) as usize;
    budget.clamp(min, max)
}
