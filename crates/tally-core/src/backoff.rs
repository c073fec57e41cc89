//! Reconnect cooldown calculation.
//!
//! The driver loop treats the link as offline for a while after a
//! transport-level failure. The cooldown doubles with each consecutive
//! failure up to a cap, with symmetric jitter so a fleet of devices does not
//! reconnect in lockstep.

use std::time::Duration;

/// Default base cooldown.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
/// Default cooldown cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Cooldown for the given zero-based consecutive failure count.
///
/// Formula: `min(max, base * 2^attempt) * (1 + (random * 2 - 1) * jitter)`.
/// `random` should come from a PRNG in `[0.0, 1.0)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn cooldown_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter_factor: f64,
    random: f64,
) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);

    let exponential = base_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    Duration::from_millis(with_jitter.round().max(0.0) as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
