//! Bit-exact audio pass-through output.
//!
//! The consumer end of the LTC input's ring: drains whatever the input's tap
//! channel captured and plays it on a separate output device. The reference
//! to the ring is the only cross-component link in the system; it is
//! detached with release ordering before the stream is torn down, so any
//! in-flight callback observes `None` and writes silence instead of touching
//! a dying producer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::audio::{open_output_stream, AudioParams, AudioResult, DeviceId, StreamInfo};
use crate::ring::PassthruRing;

use super::ChannelSelect;

#[derive(Default)]
struct Shared {
    gain: AtomicU32,
    peak: AtomicU32,
    running: AtomicBool,
}

/// Pass-through output handler. Only the primary engine owns one.
pub struct AudioThru {
    source: Arc<ArcSwapOption<PassthruRing>>,
    shared: Arc<Shared>,
    stream: Option<cpal::Stream>,
    device: Option<DeviceId>,
    channel: ChannelSelect,
    info: Option<StreamInfo>,
}

impl AudioThru {
    pub fn new() -> Self {
        let shared = Shared {
            gain: AtomicU32::new(1.0f32.to_bits()),
            ..Default::default()
        };
        Self {
            source: Arc::new(ArcSwapOption::from(None)),
            shared: Arc::new(shared),
            stream: None,
            device: None,
            channel: Some(0),
            info: None,
        }
    }

    /// Attach to `source` and start playing. The caller is responsible for
    /// snapping the ring's read position first so no historical audio
    /// drains out (see [`PassthruRing::sync_read_to_write`]).
    pub fn start(
        &mut self,
        device: &DeviceId,
        channel: ChannelSelect,
        source: Arc<PassthruRing>,
        params: &AudioParams,
    ) -> AudioResult<StreamInfo> {
        self.stop();
        self.source.store(Some(source));

        let shared = self.shared.clone();
        let ring_ref = self.source.clone();
        let open_result = open_output_stream(device, params, move |info: StreamInfo| {
            let channel = super::resolve_playback_channel(channel, info.channels);
            let mut scratch: Vec<f32> = Vec::with_capacity(16_384);

            move |data: &mut [f32], channels: u16| {
                data.fill(0.0);
                let Some(ring) = ring_ref.load_full() else {
                    shared.peak.store(0, Ordering::Relaxed);
                    return;
                };

                let stride = usize::from(channels).max(1);
                let frames = data.len() / stride;
                let primary = usize::from(channel.unwrap_or(0));
                if primary >= stride {
                    return;
                }

                scratch.clear();
                scratch.resize(frames, 0.0);
                ring.read(&mut scratch);

                let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));
                let mut peak = 0.0f32;
                for (frame, &raw) in scratch.iter().enumerate() {
                    let sample = raw * gain;
                    if sample.abs() > peak {
                        peak = sample.abs();
                    }
                    data[frame * stride + primary] = sample;
                    if channel.is_none() && stride >= 2 {
                        data[frame * stride + 1] = sample;
                    }
                }
                shared.peak.store(peak.to_bits(), Ordering::Relaxed);
            }
        });

        let (stream, info) = match open_result {
            Ok(ok) => ok,
            Err(e) => {
                self.source.store(None);
                return Err(e);
            }
        };

        self.stream = Some(stream);
        self.device = Some(device.clone());
        self.channel = super::resolve_playback_channel(channel, info.channels);
        self.info = Some(info);
        self.shared.running.store(true, Ordering::Relaxed);
        Ok(info)
    }

    /// Synchronous stop. The ring reference is detached before the stream
    /// drops, which orders the release ahead of callback removal.
    pub fn stop(&mut self) {
        self.source.store(None);
        self.stream = None;
        self.device = None;
        self.info = None;
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.peak.store(0, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn set_gain(&self, gain: f32) {
        self.shared
            .gain
            .store(gain.clamp(0.0, 4.0).to_bits(), Ordering::Relaxed);
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

impl Default for AudioThru {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioThru {
    fn drop(&mut self) {
        self.stop();
    }
}
