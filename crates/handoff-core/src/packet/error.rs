//! Packet and sample view error types

use thiserror::Error;

use super::format::AudioFormat;

/// Errors raised synchronously by packet and sample operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Write range extends past the packet's capacity
    #[error("Write of {len} bytes at offset {offset} exceeds packet capacity of {capacity} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Read index past the valid payload
    #[error("Index {index} out of range for packet payload of {size} bytes")]
    IndexOutOfRange { index: usize, size: usize },

    /// Payload size would not be a whole number of frames
    #[error("Payload of {size} bytes is not a multiple of the {frame_size}-byte frame size")]
    Misaligned { size: usize, frame_size: usize },

    /// Operation needs a format but the packet is raw bytes
    #[error("Packet has no audio format attached")]
    MissingFormat,

    /// Two formats that must agree do not
    #[error("Format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        expected: AudioFormat,
        actual: AudioFormat,
    },
}

/// Result type for packet operations
pub type PacketResult<T> = Result<T, PacketError>;
