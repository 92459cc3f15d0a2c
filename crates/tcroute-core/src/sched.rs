//! Drift-free transmission cadence.
//!
//! The MTC quarter-frame and Art-Net transmitters share one timing shape: a
//! 1 ms callback drives a fractional accumulator that advances by the *ideal*
//! interval on every emission, so integer-millisecond timer resolution never
//! accumulates into drift. Rate changes swap the interval atomically; the
//! accumulator self-adjusts without a timer restart.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Most events a single callback may emit while catching up from jitter.
pub const MAX_CATCH_UP_EVENTS: u32 = 2;

/// Fractional-accumulator pacer.
///
/// `last_send_ms` and the interval live in atomics (f64 bit patterns) so the
/// UI thread can retune the cadence while the ticker thread is running.
pub struct CadencePacer {
    interval_ms: AtomicU64,
    last_send_ms: AtomicU64,
    catch_up_bound_ms: f64,
}

impl CadencePacer {
    /// `catch_up_bound_ms` is the arrears beyond which the accumulator snaps
    /// to `now` instead of bursting (50 ms for MTC QF, 100 ms for Art-Net).
    pub fn new(interval_ms: f64, catch_up_bound_ms: f64) -> Self {
        Self {
            interval_ms: AtomicU64::new(interval_ms.to_bits()),
            last_send_ms: AtomicU64::new(0f64.to_bits()),
            catch_up_bound_ms,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        f64::from_bits(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Replace the ideal interval. Takes effect on the next tick.
    pub fn set_interval_ms(&self, interval_ms: f64) {
        self.interval_ms.store(interval_ms.to_bits(), Ordering::Relaxed);
    }

    /// Restart the accumulator at `now`, e.g. when resuming from pause.
    pub fn reset(&self, now_ms: f64) {
        self.last_send_ms.store(now_ms.to_bits(), Ordering::Relaxed);
    }

    /// How many events are due at `now_ms` (0 to [`MAX_CATCH_UP_EVENTS`]).
    ///
    /// Each counted event advances the accumulator by exactly one interval.
    /// Arrears beyond the catch-up bound reset the accumulator and emit
    /// nothing this tick.
    pub fn due(&self, now_ms: f64) -> u32 {
        let interval = self.interval_ms();
        if interval <= 0.0 {
            return 0;
        }
        let mut last = f64::from_bits(self.last_send_ms.load(Ordering::Relaxed));
        if now_ms - last > self.catch_up_bound_ms {
            self.last_send_ms.store(now_ms.to_bits(), Ordering::Relaxed);
            return 0;
        }
        let mut count = 0;
        while now_ms - last >= interval && count < MAX_CATCH_UP_EVENTS {
            last += interval;
            count += 1;
        }
        if count > 0 {
            self.last_send_ms.store(last.to_bits(), Ordering::Relaxed);
        }
        count
    }
}

/// A dedicated ~1 ms callback thread with cooperative shutdown.
///
/// The callback runs to completion on every pass; `stop()` sets the flag and
/// joins, so after it returns no further callback invocation can happen.
pub struct Ticker {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(name: &str, mut callback: impl FnMut() + Send + 'static) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !shutdown_flag.load(Ordering::Relaxed) {
                    callback();
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .ok();
        if handle.is_none() {
            log::error!("failed to spawn ticker thread '{name}'");
        }
        Self { shutdown, handle }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
