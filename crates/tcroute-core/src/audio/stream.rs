//! Stream construction.
//!
//! Opens f32 streams with the caller's preferred sample rate and buffer
//! size, falling back to whatever the device supports. The callback factory
//! receives the negotiated [`StreamInfo`] (codecs need the real sample rate)
//! and returns the data callback, which then runs on the device thread and
//! must not block or allocate.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};

use super::config::{AudioParams, DeviceId};
use super::device::{find_device, Direction};
use super::error::{AudioError, AudioResult};

/// What the device actually gave us.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub sample_rate: u32,
    /// Frames per callback when a fixed size was negotiated.
    pub buffer_size: Option<u32>,
    pub channels: u16,
}

fn pick_config(
    configs: Vec<SupportedStreamConfigRange>,
    params: &AudioParams,
    label: &str,
) -> AudioResult<(StreamConfig, StreamInfo)> {
    let f32_configs: Vec<_> = configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .cloned()
        .collect();
    if f32_configs.is_empty() {
        return Err(AudioError::UnsupportedFormat(label.to_string()));
    }

    let wanted_rate = params.sample_rate.unwrap_or(48_000);
    let best = f32_configs
        .iter()
        .find(|c| wanted_rate >= c.min_sample_rate().0 && wanted_rate <= c.max_sample_rate().0)
        .or_else(|| f32_configs.first())
        .cloned()
        .ok_or_else(|| AudioError::ConfigError(format!("no usable config on {label}")))?;

    let sample_rate = if wanted_rate >= best.min_sample_rate().0
        && wanted_rate <= best.max_sample_rate().0
    {
        wanted_rate
    } else {
        let fallback = best.max_sample_rate().0;
        log::warn!("{label} does not support {wanted_rate} Hz, using {fallback} Hz");
        fallback
    };

    let buffer_size = params.buffer_size.map(|frames| frames.clamp(16, 8192));
    let config = StreamConfig {
        channels: best.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: buffer_size.map_or(BufferSize::Default, BufferSize::Fixed),
    };
    let info = StreamInfo {
        sample_rate,
        buffer_size,
        channels: best.channels(),
    };
    Ok((config, info))
}

/// Open and start a capture stream on `id`.
pub fn open_input_stream<F>(
    id: &DeviceId,
    params: &AudioParams,
    make_callback: impl FnOnce(StreamInfo) -> F,
) -> AudioResult<(Stream, StreamInfo)>
where
    F: FnMut(&[f32], u16) + Send + 'static,
{
    let device = find_device(id, Direction::Input)?;
    let configs = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();
    let (config, info) = pick_config(configs, params, &id.display_label())?;
    let channels = info.channels;
    let mut callback = make_callback(info);

    let label = id.display_label();
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| callback(data, channels),
            move |e| log::error!("input stream error on {label}: {e}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!(
        "opened input {} at {} Hz, {} channels",
        id.display_label(),
        info.sample_rate,
        info.channels
    );
    Ok((stream, info))
}

/// Open and start a playback stream on `id`.
pub fn open_output_stream<F>(
    id: &DeviceId,
    params: &AudioParams,
    make_callback: impl FnOnce(StreamInfo) -> F,
) -> AudioResult<(Stream, StreamInfo)>
where
    F: FnMut(&mut [f32], u16) + Send + 'static,
{
    let device = find_device(id, Direction::Output)?;
    let configs = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();
    let (config, info) = pick_config(configs, params, &id.display_label())?;
    let channels = info.channels;
    let mut callback = make_callback(info);

    let label = id.display_label();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data, channels),
            move |e| log::error!("output stream error on {label}: {e}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!(
        "opened output {} at {} Hz, {} channels",
        id.display_label(),
        info.sample_rate,
        info.channels
    );
    Ok((stream, info))
}
