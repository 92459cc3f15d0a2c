//! Audio adapter error types.

use thiserror::Error;

/// Errors that can occur while opening or running audio devices.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available for the requested direction
    #[error("No audio devices found")]
    NoDevices,

    /// Device not found by its identifier
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build an audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device exposes no f32 configuration we can use
    #[error("Unsupported sample format on {0}")]
    UnsupportedFormat(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
