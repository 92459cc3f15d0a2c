//! LTC audio input handler.
//!
//! Owns the capture stream, runs the biphase decoder on one channel and
//! optionally taps a second channel into the pass-through ring for the
//! AudioThru output on another device. Decoded timecode, detected rate,
//! liveness timestamp and peak levels are all published through relaxed
//! atomics; the ring positions carry their own release/acquire ordering.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::audio::{open_input_stream, AudioParams, AudioResult, DeviceId, StreamInfo};
use crate::clock::{self, LIVENESS_TIMEOUT_MS};
use crate::ltc::LtcDecoder;
use crate::ring::PassthruRing;
use crate::types::{FrameRate, Timecode};

struct Shared {
    packed_tc: AtomicU32,
    fps_index: AtomicU8,
    last_frame_ms: AtomicU64,
    input_gain: AtomicU32,
    thru_gain: AtomicU32,
    ltc_peak: AtomicU32,
    thru_peak: AtomicU32,
    running: AtomicBool,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            packed_tc: AtomicU32::new(0),
            fps_index: AtomicU8::new(FrameRate::Fps25.to_index()),
            last_frame_ms: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
            input_gain: AtomicU32::new(1.0f32.to_bits()),
            thru_gain: AtomicU32::new(1.0f32.to_bits()),
            ltc_peak: AtomicU32::new(0),
            thru_peak: AtomicU32::new(0),
            running: AtomicBool::new(false),
        }
    }
}

/// LTC input handler. The ring it owns has exactly one producer (this
/// handler's audio callback) and one consumer (the AudioThru callback).
pub struct LtcInput {
    shared: Arc<Shared>,
    ring: Arc<PassthruRing>,
    stream: Option<cpal::Stream>,
    device: Option<DeviceId>,
    ltc_channel: u16,
    thru_channel: Option<u16>,
    info: Option<StreamInfo>,
}

impl LtcInput {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            ring: Arc::new(PassthruRing::new()),
            stream: None,
            device: None,
            ltc_channel: 0,
            thru_channel: None,
            info: None,
        }
    }

    /// Open the device and start decoding `ltc_channel`; `thru_channel`
    /// additionally feeds the pass-through ring. Channel indices beyond what
    /// the device offers fall back the way the device-open dialog promises:
    /// LTC to channel 0, pass-through to disabled.
    pub fn start(
        &mut self,
        device: &DeviceId,
        ltc_channel: u16,
        thru_channel: Option<u16>,
        params: &AudioParams,
    ) -> AudioResult<StreamInfo> {
        self.stop();

        let shared = self.shared.clone();
        let ring = self.ring.clone();
        self.ring.sync_read_to_write();
        self.ring.reset_counters();
        self.shared
            .last_frame_ms
            .store(f64::NEG_INFINITY.to_bits(), Ordering::Relaxed);

        let (stream, info) = open_input_stream(device, params, move |info: StreamInfo| {
            let (ltc, thru) =
                super::resolve_capture_channels(ltc_channel, thru_channel, info.channels);
            let ltc_ch = usize::from(ltc);
            let thru_ch = thru.map(usize::from);

            let mut decoder = LtcDecoder::new(f64::from(info.sample_rate));
            let mut scratch: Vec<f32> = Vec::with_capacity(16_384);

            move |data: &[f32], channels: u16| {
                let stride = usize::from(channels).max(1);

                // Pass-through tap first, so an expensive decode can never
                // starve the ring.
                if let Some(tap) = thru_ch {
                    let gain = f32::from_bits(shared.thru_gain.load(Ordering::Relaxed));
                    scratch.clear();
                    scratch.extend(data.iter().skip(tap).step_by(stride));
                    let report = ring.write_scaled(&scratch, gain);
                    shared.thru_peak.store(report.peak.to_bits(), Ordering::Relaxed);
                }

                let gain = f32::from_bits(shared.input_gain.load(Ordering::Relaxed));
                let mut peak = 0.0f32;
                for &raw in data.iter().skip(ltc_ch).step_by(stride) {
                    let sample = raw * gain;
                    if sample.abs() > peak {
                        peak = sample.abs();
                    }
                    if let Some(frame) = decoder.push_sample(sample) {
                        shared.packed_tc.store(frame.timecode.pack(), Ordering::Relaxed);
                        if let Some(fps) = frame.detected_fps {
                            shared.fps_index.store(fps.to_index(), Ordering::Relaxed);
                        }
                        shared
                            .last_frame_ms
                            .store(clock::now_ms().to_bits(), Ordering::Relaxed);
                    }
                }
                shared.ltc_peak.store(peak.to_bits(), Ordering::Relaxed);
            }
        })?;

        let (resolved_ltc, resolved_thru) =
            super::resolve_capture_channels(ltc_channel, thru_channel, info.channels);
        self.stream = Some(stream);
        self.device = Some(device.clone());
        self.ltc_channel = resolved_ltc;
        self.thru_channel = resolved_thru;
        self.info = Some(info);
        self.shared.running.store(true, Ordering::Relaxed);
        Ok(info)
    }

    /// Synchronous stop: dropping the stream removes the device callback
    /// before this returns.
    pub fn stop(&mut self) {
        self.stream = None;
        self.device = None;
        self.info = None;
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.ltc_peak.store(0, Ordering::Relaxed);
        self.shared.thru_peak.store(0, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn is_receiving(&self) -> bool {
        let last = f64::from_bits(self.shared.last_frame_ms.load(Ordering::Relaxed));
        clock::now_ms() - last < LIVENESS_TIMEOUT_MS
    }

    pub fn current_timecode(&self) -> Timecode {
        Timecode::unpack(self.shared.packed_tc.load(Ordering::Relaxed))
    }

    pub fn detected_fps(&self) -> FrameRate {
        FrameRate::from_index(self.shared.fps_index.load(Ordering::Relaxed))
    }

    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    pub fn ltc_channel(&self) -> u16 {
        self.ltc_channel
    }

    pub fn has_thru_channel(&self) -> bool {
        self.thru_channel.is_some()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    /// The pass-through ring, for wiring up an AudioThru consumer.
    pub fn ring(&self) -> Arc<PassthruRing> {
        self.ring.clone()
    }

    pub fn set_input_gain(&self, gain: f32) {
        self.shared
            .input_gain
            .store(gain.clamp(0.0, 4.0).to_bits(), Ordering::Relaxed);
    }

    pub fn set_thru_gain(&self, gain: f32) {
        self.shared
            .thru_gain
            .store(gain.clamp(0.0, 4.0).to_bits(), Ordering::Relaxed);
    }

    pub fn ltc_peak(&self) -> f32 {
        f32::from_bits(self.shared.ltc_peak.load(Ordering::Relaxed))
    }

    pub fn thru_peak(&self) -> f32 {
        f32::from_bits(self.shared.thru_peak.load(Ordering::Relaxed))
    }
}

impl Default for LtcInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LtcInput {
    fn drop(&mut self) {
        self.stop();
    }
}
