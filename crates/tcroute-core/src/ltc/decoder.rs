//! Biphase-mark LTC decoder.
//!
//! A pure sample-in/frame-out state machine: the caller applies input gain,
//! feeds mono samples one at a time and gets back a [`DecodedFrame`] whenever
//! a sync word closes a valid frame. All timing is derived from sample
//! counts, so the decoder is deterministic and testable without a device.
//!
//! Signal path: a hysteresis comparator turns samples into edges; inter-edge
//! intervals are classified against an exponentially-filtered bit-period
//! estimate (half-bit pairs are `1`s, whole bits are `0`s); bits shift into
//! an 80-bit register until the sync word appears in the top 16 bits.

use crate::ltc::frame::{self, SYNC_WORD};
use crate::types::{FrameRate, Timecode};

/// Symmetric comparator thresholds on the +-1.0 sample range.
const HYSTERESIS_THRESHOLD: f32 = 0.05;

/// Weight of a fresh measurement in the bit-period EWMA.
const PERIOD_EWMA_WEIGHT: f64 = 0.05;

/// Accepted frames required before a rate change is published.
const RATE_CONFIRM_FRAMES: u32 = 3;

/// One frame recovered from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub timecode: Timecode,
    pub drop_frame: bool,
    /// Present once the rate estimator has seen three consecutive good
    /// frames; `None` while it is still converging.
    pub detected_fps: Option<FrameRate>,
}

pub struct LtcDecoder {
    sample_rate: f64,

    // Comparator
    signal_high: bool,
    samples_since_edge: u32,
    first_edge_after_reset: bool,

    // Bit clock
    bit_period_estimate: f64,
    half_bit_pending: bool,

    // Frame assembly
    shift_low: u64,
    shift_high: u16,
    samples_since_sync: f64,
    consecutive_good: u32,
    confirmed_fps: Option<FrameRate>,
}

impl LtcDecoder {
    pub fn new(sample_rate: f64) -> Self {
        let mut decoder = Self {
            sample_rate,
            signal_high: false,
            samples_since_edge: 0,
            first_edge_after_reset: true,
            bit_period_estimate: 0.0,
            half_bit_pending: false,
            shift_low: 0,
            shift_high: 0,
            samples_since_sync: 0.0,
            consecutive_good: 0,
            confirmed_fps: None,
        };
        decoder.reset();
        decoder
    }

    pub fn reset(&mut self) {
        self.signal_high = false;
        self.samples_since_edge = 0;
        self.first_edge_after_reset = true;
        self.half_bit_pending = false;
        self.shift_low = 0;
        self.shift_high = 0;
        self.samples_since_sync = 0.0;
        self.consecutive_good = 0;
        self.confirmed_fps = None;
        self.bit_period_estimate = self.sample_rate / 2160.0;
    }

    /// Feed one (already gain-scaled) sample. Returns a frame when the sync
    /// word closes one with valid fields.
    pub fn push_sample(&mut self, sample: f32) -> Option<DecodedFrame> {
        self.samples_since_edge += 1;
        self.samples_since_sync += 1.0;

        let edge = if self.signal_high {
            if sample < -HYSTERESIS_THRESHOLD {
                self.signal_high = false;
                true
            } else {
                false
            }
        } else if sample > HYSTERESIS_THRESHOLD {
            self.signal_high = true;
            true
        } else {
            false
        };

        if !edge {
            return None;
        }
        let interval = self.samples_since_edge;
        self.samples_since_edge = 0;
        self.on_edge(interval)
    }

    fn on_edge(&mut self, interval_samples: u32) -> Option<DecodedFrame> {
        if self.first_edge_after_reset {
            self.first_edge_after_reset = false;
            return None;
        }

        let interval = f64::from(interval_samples);
        let half_bit = self.bit_period_estimate * 0.5;
        let threshold = self.bit_period_estimate * 0.75;

        // Outside the plausible window: treat as noise and drop any pending
        // half-bit so a glitch cannot fabricate a `1`.
        if interval < half_bit * 0.4 || interval > self.bit_period_estimate * 1.8 {
            self.half_bit_pending = false;
            return None;
        }

        if interval < threshold {
            if self.half_bit_pending {
                self.half_bit_pending = false;
                self.track_period(interval * 2.0);
                self.push_bit(1)
            } else {
                self.half_bit_pending = true;
                None
            }
        } else {
            self.half_bit_pending = false;
            self.track_period(interval);
            self.push_bit(0)
        }
    }

    fn track_period(&mut self, measured: f64) {
        self.bit_period_estimate =
            self.bit_period_estimate * (1.0 - PERIOD_EWMA_WEIGHT) + measured * PERIOD_EWMA_WEIGHT;
    }

    fn push_bit(&mut self, bit: u8) -> Option<DecodedFrame> {
        self.shift_low = (self.shift_low >> 1) | (u64::from(self.shift_high & 1) << 63);
        self.shift_high = (self.shift_high >> 1) | (u16::from(bit & 1) << 15);
        if self.shift_high == SYNC_WORD {
            self.on_sync_word()
        } else {
            None
        }
    }

    fn on_sync_word(&mut self) -> Option<DecodedFrame> {
        let Some((timecode, drop_frame)) = frame::unpack_time_bits(self.shift_low) else {
            self.consecutive_good = 0;
            self.samples_since_sync = 0.0;
            return None;
        };

        if self.samples_since_sync > 0.0 {
            let measured_fps = self.sample_rate / self.samples_since_sync;
            // 23.976 vs 24 and 30 vs 29.97 non-drop are indistinguishable on
            // the wire; the user override in the engine handles those.
            let detected = if measured_fps < 24.5 {
                FrameRate::Fps24
            } else if measured_fps < 27.0 {
                FrameRate::Fps25
            } else if drop_frame {
                FrameRate::Fps2997
            } else {
                FrameRate::Fps30
            };

            self.consecutive_good += 1;
            if self.consecutive_good >= RATE_CONFIRM_FRAMES {
                self.confirmed_fps = Some(detected);
            }
        } else {
            self.consecutive_good = 1;
        }
        self.samples_since_sync = 0.0;

        Some(DecodedFrame {
            timecode,
            drop_frame,
            detected_fps: self.confirmed_fps,
        })
    }
}
