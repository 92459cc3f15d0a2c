//! LTC audio output handler.
//!
//! Owns the playback stream and an [`LtcEncoder`] living inside its
//! callback. The engine only ever touches atomics: target timecode, rate,
//! gain and the paused flag. While paused the callback writes silence and
//! the published peak drops to zero.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crate::audio::{open_output_stream, AudioParams, AudioResult, DeviceId, StreamInfo};
use crate::ltc::LtcEncoder;
use crate::types::{FrameRate, Timecode};

use super::ChannelSelect;

/// Sentinel for "no target yet": hours byte 0xFF can never come from a
/// packed timecode.
const TARGET_NONE: u32 = u32::MAX;

struct Shared {
    packed_target: AtomicU32,
    fps_index: AtomicU8,
    paused: AtomicBool,
    gain: AtomicU32,
    peak: AtomicU32,
    running: AtomicBool,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            packed_target: AtomicU32::new(TARGET_NONE),
            fps_index: AtomicU8::new(FrameRate::Fps30.to_index()),
            paused: AtomicBool::new(false),
            gain: AtomicU32::new(1.0f32.to_bits()),
            peak: AtomicU32::new(0),
            running: AtomicBool::new(false),
        }
    }
}

/// LTC output handler.
pub struct LtcOutput {
    shared: Arc<Shared>,
    stream: Option<cpal::Stream>,
    device: Option<DeviceId>,
    channel: ChannelSelect,
    info: Option<StreamInfo>,
}

impl LtcOutput {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            stream: None,
            device: None,
            channel: Some(0),
            info: None,
        }
    }

    /// Open the device and start rendering. `channel` picks one output
    /// channel, or `None` for stereo mode on channels 0 and 1.
    pub fn start(
        &mut self,
        device: &DeviceId,
        channel: ChannelSelect,
        params: &AudioParams,
    ) -> AudioResult<StreamInfo> {
        self.stop();

        let shared = self.shared.clone();
        let (stream, info) = open_output_stream(device, params, move |info: StreamInfo| {
            let channel = super::resolve_playback_channel(channel, info.channels);

            let mut encoder = LtcEncoder::new(
                f64::from(info.sample_rate),
                FrameRate::from_index(shared.fps_index.load(Ordering::Relaxed)),
            );
            let mut scratch: Vec<f32> = Vec::with_capacity(16_384);

            move |data: &mut [f32], channels: u16| {
                data.fill(0.0);
                if shared.paused.load(Ordering::Relaxed) {
                    shared.peak.store(0, Ordering::Relaxed);
                    return;
                }

                let stride = usize::from(channels).max(1);
                let frames = data.len() / stride;
                let primary = usize::from(channel.unwrap_or(0));
                if primary >= stride {
                    return;
                }

                encoder.set_fps(FrameRate::from_index(
                    shared.fps_index.load(Ordering::Relaxed),
                ));
                let packed = shared.packed_target.load(Ordering::Relaxed);
                let target = (packed != TARGET_NONE).then(|| Timecode::unpack(packed));
                let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));

                scratch.clear();
                scratch.resize(frames, 0.0);
                let peak = encoder.fill(&mut scratch, target, gain);

                for (frame, &sample) in scratch.iter().enumerate() {
                    data[frame * stride + primary] = sample;
                    if channel.is_none() && stride >= 2 {
                        data[frame * stride + 1] = sample;
                    }
                }
                shared.peak.store(peak.to_bits(), Ordering::Relaxed);
            }
        })?;

        self.stream = Some(stream);
        self.device = Some(device.clone());
        self.channel = super::resolve_playback_channel(channel, info.channels);
        self.info = Some(info);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Relaxed);
        Ok(info)
    }

    pub fn stop(&mut self) {
        self.stream = None;
        self.device = None;
        self.info = None;
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.packed_target.store(TARGET_NONE, Ordering::Relaxed);
        self.shared.peak.store(0, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn set_timecode(&self, tc: Timecode) {
        self.shared.packed_target.store(tc.pack(), Ordering::Relaxed);
    }

    pub fn set_fps(&self, fps: FrameRate) {
        self.shared.fps_index.store(fps.to_index(), Ordering::Relaxed);
    }

    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Relaxed);
        if paused {
            self.shared.peak.store(0, Ordering::Relaxed);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn set_gain(&self, gain: f32) {
        self.shared
            .gain
            .store(gain.clamp(0.0, 2.0).to_bits(), Ordering::Relaxed);
    }

    pub fn peak_level(&self) -> f32 {
        f32::from_bits(self.shared.peak.load(Ordering::Relaxed))
    }

    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    pub fn channel(&self) -> ChannelSelect {
        self.channel
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }
}

impl Default for LtcOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LtcOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
