//! Audio device error types

use thiserror::Error;

use crate::barrier::BarrierError;
use crate::packet::FormatError;

/// Errors that can occur during audio device operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
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

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Capture and playback sides disagree on the sample rate
    #[error("Sample rate mismatch: capture={capture}Hz, playback={playback}Hz")]
    SampleRateMismatch { capture: u32, playback: u32 },

    /// Operation needs an initialized device
    #[error("Audio device '{0}' is not initialized")]
    NotInitialized(String),

    /// A helper thread could not be created
    #[error("Failed to spawn thread '{name}': {reason}")]
    ThreadSpawn { name: String, reason: String },

    #[error("Invalid format: {0}")]
    Format(#[from] FormatError),

    #[error("Barrier error: {0}")]
    Barrier(#[from] BarrierError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
