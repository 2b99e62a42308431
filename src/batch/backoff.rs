//! Backoff Module
//!
//! Exponential retry delays with an upper cap.

use std::cmp::min;
use std::time::Duration;

/// Delay before retry `attempt` (1-indexed): `base_delay * base^attempt`,
/// clamped to `max_delay`. Overflow saturates to `max_delay`.
pub fn retry_delay(base_delay: Duration, base: f64, attempt: u32, max_delay: Duration) -> Duration {
    if base_delay.is_zero() {
        return Duration::ZERO;
    }

    let factor = base.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    min(
        nanos_to_duration_saturating(base_delay.as_nanos() as f64 * factor),
        max_delay,
    )
}

fn nanos_to_duration_saturating(nanos: f64) -> Duration {
    if nanos.is_nan() || nanos <= 0.0 {
        return Duration::ZERO;
    }
    if nanos >= u64::MAX as f64 {
        return Duration::MAX;
    }

    Duration::from_nanos(nanos.round() as u64)
}
