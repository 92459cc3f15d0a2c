//! Monotonic millisecond clock and wall-clock helpers.
//!
//! All liveness timestamps and scheduler accumulators in this crate share a
//! single process-wide epoch so that values taken on different threads are
//! directly comparable.

use std::sync::OnceLock;
use std::time::Instant;

use chrono::Timelike;

/// How long an input may stay silent before it counts as paused.
pub const LIVENESS_TIMEOUT_MS: f64 = 150.0;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process. Monotonic, fractional.
pub fn now_ms() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

/// Local-time milliseconds since midnight, for the system-clock input source.
pub fn ms_since_midnight() -> f64 {
    let t = chrono::Local::now().time();
    f64::from(t.num_seconds_from_midnight()) * 1000.0 + f64::from(t.nanosecond()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn ms_since_midnight_in_range() {
        let ms = ms_since_midnight();
        assert!(ms >= 0.0 && ms < 86_400_000.0);
    }
}
