//! Single-producer/single-consumer pass-through ring buffer.
//!
//! Glues the LTC input audio callback (producer) to the AudioThru output
//! callback (consumer) running on a different device. One slot is reserved so
//! a full ring is distinguishable from an empty one: positions are free-running
//! `u32` counters compared with wrap-around arithmetic, and a write needs at
//! least two free slots.
//!
//! The producer publishes `write_pos` with release ordering after filling
//! slots; the consumer acquires it before reading (and symmetrically for
//! `read_pos`), which is the only happens-before edge the sample data needs.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

/// Ring capacity in samples. Power of two so positions index with a mask.
pub const RING_CAPACITY: u32 = 32_768;
const RING_MASK: u32 = RING_CAPACITY - 1;

/// What a producer-side write accomplished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteReport {
    /// Samples actually stored (the rest were dropped at the tail).
    pub written: usize,
    /// Peak magnitude over the whole incoming block, including dropped
    /// samples, so the meter stays honest during overrun.
    pub peak: f32,
}

/// Fixed-size SPSC float ring with overrun/underrun accounting.
pub struct PassthruRing {
    buf: Box<[UnsafeCell<f32>]>,
    write_pos: AtomicU32,
    read_pos: AtomicU32,
    overruns: AtomicU32,
    underruns: AtomicU32,
}

// One producer and one consumer touch disjoint slot ranges, ordered by the
// release/acquire pairs on the position counters.
unsafe impl Sync for PassthruRing {}
unsafe impl Send for PassthruRing {}

impl PassthruRing {
    pub fn new() -> Self {
        let buf = (0..RING_CAPACITY).map(|_| UnsafeCell::new(0.0)).collect();
        Self {
            buf,
            write_pos: AtomicU32::new(0),
            read_pos: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
        }
    }

    /// Samples currently buffered.
    pub fn used(&self) -> u32 {
        self.write_pos
            .load(Ordering::Acquire)
            .wrapping_sub(self.read_pos.load(Ordering::Acquire))
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
    }

    /// Snap the read pointer to the current write pointer so a consumer that
    /// is about to start does not drain historical data. Call from the
    /// consumer side before its first read.
    pub fn sync_read_to_write(&self) {
        let wp = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(wp, Ordering::Release);
    }

    /// Producer side: scale `samples` by `gain` and append what fits.
    ///
    /// The returned peak covers every incoming sample (post-gain) whether or
    /// not it was stored. Truncation bumps the overrun counter once per call.
    pub fn write_scaled(&self, samples: &[f32], gain: f32) -> WriteReport {
        let wp = self.write_pos.load(Ordering::Relaxed);
        let rp = self.read_pos.load(Ordering::Acquire);
        let used = wp.wrapping_sub(rp);
        // A reader can only move read_pos forward, so used never exceeds
        // capacity - 1; in release a violation degrades to a zero write.
        debug_assert!(used < RING_CAPACITY, "ring positions out of sync");
        let free = RING_CAPACITY.saturating_sub(used);
        // One slot stays reserved to disambiguate full from empty.
        let writable = free.saturating_sub(1) as usize;
        let to_write = samples.len().min(writable);

        let mut peak = 0.0f32;
        for (i, &raw) in samples.iter().enumerate() {
            let s = raw * gain;
            let magnitude = s.abs();
            if magnitude > peak {
                peak = magnitude;
            }
            if i < to_write {
                let slot = (wp.wrapping_add(i as u32) & RING_MASK) as usize;
                unsafe { *self.buf[slot].get() = s };
            }
        }

        self.write_pos
            .store(wp.wrapping_add(to_write as u32), Ordering::Release);
        if to_write < samples.len() {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        WriteReport { written: to_write, peak }
    }

    /// Consumer side: fill `out` from the ring, zero-filling any tail the
    /// ring cannot satisfy. Returns the number of real samples copied; a
    /// short read bumps the underrun counter once.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let rp = self.read_pos.load(Ordering::Relaxed);
        let available = wp.wrapping_sub(rp) as usize;
        let to_read = out.len().min(available);

        for (i, slot) in out.iter_mut().take(to_read).enumerate() {
            let idx = (rp.wrapping_add(i as u32) & RING_MASK) as usize;
            *slot = unsafe { *self.buf[idx].get() };
        }
        for slot in out.iter_mut().skip(to_read) {
            *slot = 0.0;
        }

        self.read_pos
            .store(rp.wrapping_add(to_read as u32), Ordering::Release);
        if to_read < out.len() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        to_read
    }
}

impl Default for PassthruRing {
    fn default() -> Self {
        Self::new()
    }
}
