//! Audio backend error types

use thiserror::Error;

/// Errors that can occur during audio operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// The backend refused the requested stream format
    #[error("Unsupported format: {channels} channels at {sample_rate}Hz ({reason})")]
    UnsupportedFormat {
        sample_rate: u32,
        channels: u16,
        reason: String,
    },

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Failed to pause stream
    #[error("Failed to pause audio stream: {0}")]
    StreamPauseError(String),

    /// Stream error during playback
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// Endpoint volume could not be applied
    #[error("Failed to set endpoint volume: {0}")]
    VolumeError(String),

    /// Backend was not compiled into this build
    #[error("Audio backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
