//! Device abstraction shared by capture and playback backends
//!
//! A device goes through three steps:
//! 1. [`initialize`](AudioDevice::initialize) negotiates a stream format with
//!    the driver and returns it, so the pipeline can be built for that format
//! 2. the pipeline endpoint is attached to the device
//! 3. [`start`](AudioDevice::start) opens the stream; the driver thread then
//!    calls the endpoint until [`stop`](AudioDevice::stop)

use super::config::{BufferSize, DeviceId};
use super::error::AudioResult;
use crate::packet::AudioFormat;

/// Direction of a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Capture,
    Playback,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Capture => f.write_str("capture"),
            DeviceKind::Playback => f.write_str("playback"),
        }
    }
}

/// What the caller would like the stream to look like
///
/// Every field is a preference; the driver has the final word and the
/// negotiated format is returned by [`AudioDevice::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamRequest {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub buffer_size: BufferSize,
}

impl StreamRequest {
    /// Request matching an existing format
    pub fn for_format(format: &AudioFormat, buffer_size: BufferSize) -> Self {
        Self {
            sample_rate: Some(format.sample_rate()),
            channels: Some(format.channels()),
            buffer_size,
        }
    }
}

/// A capture or playback device
pub trait AudioDevice {
    fn id(&self) -> &DeviceId;

    fn kind(&self) -> DeviceKind;

    /// Negotiated format, None before [`initialize`](Self::initialize)
    fn format(&self) -> Option<AudioFormat>;

    /// Initialized and ready to start
    fn is_valid(&self) -> bool;

    /// Negotiate a stream configuration with the driver
    fn initialize(&mut self, request: &StreamRequest) -> AudioResult<AudioFormat>;

    /// Open and run the stream
    fn start(&mut self) -> AudioResult<()>;

    /// Stop the stream and release it
    fn stop(&mut self) -> AudioResult<()>;

    fn is_running(&self) -> bool;
}
