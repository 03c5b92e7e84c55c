//! Audio format tag
//!
//! `AudioFormat` describes how the raw bytes of a packet are laid out:
//! channel count, sample rate, sample width and encoding. It is attached to
//! packets, devices and pipeline stages so that byte buffers never travel
//! without context.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample widths accepted by [`AudioFormat::new`]
pub const SUPPORTED_BIT_DEPTHS: [u16; 5] = [8, 16, 24, 32, 64];

/// Errors raised when constructing an invalid format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Channel count of zero
    #[error("Audio format must have at least one channel")]
    ZeroChannels,

    /// Sample rate of zero
    #[error("Audio format sample rate must be greater than zero")]
    ZeroSampleRate,

    /// Bit depth outside of 8/16/24/32/64
    #[error("Unsupported bit depth: {0} (expected one of 8, 16, 24, 32, 64)")]
    UnsupportedBitDepth(u16),

    /// Float encoding with a width that has no IEEE representation here
    #[error("Float samples must be 32 or 64 bits wide, got {0}")]
    UnsupportedFloatWidth(u16),
}

/// How individual samples are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleEncoding {
    /// Linear PCM integers (8-bit is unsigned, wider widths are signed)
    #[default]
    PcmInt,
    /// IEEE 754 floats, nominal range [-1.0, 1.0]
    PcmFloat,
}

/// Serialized form of [`AudioFormat`], validated on the way in
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawAudioFormat {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    #[serde(default)]
    encoding: SampleEncoding,
}

/// Immutable description of an audio stream
///
/// Valid by construction: every `AudioFormat` in the program has at least
/// one channel, a non-zero sample rate and a supported sample width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAudioFormat", into = "RawAudioFormat")]
pub struct AudioFormat {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    encoding: SampleEncoding,
}

impl AudioFormat {
    /// Create a format, rejecting invalid parameters
    pub fn new(
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        encoding: SampleEncoding,
    ) -> Result<Self, FormatError> {
        if channels == 0 {
            return Err(FormatError::ZeroChannels);
        }
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&bits_per_sample) {
            return Err(FormatError::UnsupportedBitDepth(bits_per_sample));
        }
        if encoding == SampleEncoding::PcmFloat && !matches!(bits_per_sample, 32 | 64) {
            return Err(FormatError::UnsupportedFloatWidth(bits_per_sample));
        }

        Ok(Self {
            channels,
            sample_rate,
            bits_per_sample,
            encoding,
        })
    }

    /// Signed 16-bit PCM
    pub fn pcm_i16(channels: u16, sample_rate: u32) -> Result<Self, FormatError> {
        Self::new(channels, sample_rate, 16, SampleEncoding::PcmInt)
    }

    /// 32-bit float PCM (the native format of most desktop hosts)
    pub fn pcm_f32(channels: u16, sample_rate: u32) -> Result<Self, FormatError> {
        Self::new(channels, sample_rate, 32, SampleEncoding::PcmFloat)
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    #[inline]
    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Bytes occupied by one mono sample
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes occupied by one frame (one sample per channel)
    #[inline]
    pub fn frame_size_bytes(&self) -> usize {
        usize::from(self.channels) * self.bytes_per_sample()
    }

    #[inline]
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.frame_size_bytes()
    }

    /// Whole frames contained in `bytes` (partial trailing frame ignored)
    #[inline]
    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        bytes / self.frame_size_bytes()
    }

    /// Playback duration of `bytes` worth of audio in this format
    pub fn duration_of_bytes(&self, bytes: usize) -> Duration {
        let frames = self.bytes_to_frames(bytes) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / u64::from(self.sample_rate))
    }

    /// Byte value that encodes silence
    ///
    /// 8-bit PCM is offset-binary, so silence sits at 0x80.
    #[inline]
    pub fn silence_byte(&self) -> u8 {
        if self.encoding == SampleEncoding::PcmInt && self.bits_per_sample == 8 {
            0x80
        } else {
            0
        }
    }
}

impl TryFrom<RawAudioFormat> for AudioFormat {
    type Error = FormatError;

    fn try_from(raw: RawAudioFormat) -> Result<Self, Self::Error> {
        Self::new(raw.channels, raw.sample_rate, raw.bits_per_sample, raw.encoding)
    }
}

impl From<AudioFormat> for RawAudioFormat {
    fn from(format: AudioFormat) -> Self {
        Self {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            encoding: format.encoding,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.encoding {
            SampleEncoding::PcmInt => "int",
            SampleEncoding::PcmFloat => "float",
        };
        write!(
            f,
            "{}ch {}Hz {}-bit {}",
            self.channels, self.sample_rate, self.bits_per_sample, kind
        )
    }
}
