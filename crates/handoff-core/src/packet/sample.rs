//! Non-owning typed views over packet memory
//!
//! An `AudioSample` interprets a borrowed byte slice according to an
//! [`AudioFormat`], giving frame/channel indexed access to sample values.
//! Views borrow from the packet that owns the bytes, so the borrow checker
//! guarantees a view never outlives its packet and that the packet is not
//! reassigned while a view is alive.
//!
//! Values are exchanged as `f64`:
//! - Integer PCM is normalized to [-1.0, 1.0). 8-bit PCM is unsigned
//!   offset-binary, wider widths are signed two's complement.
//! - Float PCM is passed through unchanged.
//!
//! Multi-byte samples use the host's native byte order (which is what audio
//! hosts hand us), except 24-bit samples which are packed 3-byte little-endian.

use super::error::{PacketError, PacketResult};
use super::format::{AudioFormat, SampleEncoding};

const SCALE_I8: f64 = 128.0;
const SCALE_I16: f64 = 32_768.0;
const SCALE_I24: f64 = 8_388_608.0;
const SCALE_I32: f64 = 2_147_483_648.0;
const SCALE_I64: f64 = 9_223_372_036_854_775_808.0;

/// Decode one sample from exactly `format.bytes_per_sample()` bytes
#[inline]
fn decode(format: &AudioFormat, bytes: &[u8]) -> f64 {
    match (format.encoding(), format.bits_per_sample()) {
        (SampleEncoding::PcmInt, 8) => (f64::from(bytes[0]) - SCALE_I8) / SCALE_I8,
        (SampleEncoding::PcmInt, 16) => {
            f64::from(bytemuck::pod_read_unaligned::<i16>(bytes)) / SCALE_I16
        }
        (SampleEncoding::PcmInt, 24) => {
            let raw = i32::from(bytes[0]) | i32::from(bytes[1]) << 8 | i32::from(bytes[2]) << 16;
            // sign-extend from bit 23
            f64::from((raw << 8) >> 8) / SCALE_I24
        }
        (SampleEncoding::PcmInt, 32) => {
            f64::from(bytemuck::pod_read_unaligned::<i32>(bytes)) / SCALE_I32
        }
        (SampleEncoding::PcmInt, _) => {
            bytemuck::pod_read_unaligned::<i64>(bytes) as f64 / SCALE_I64
        }
        (SampleEncoding::PcmFloat, 32) => f64::from(bytemuck::pod_read_unaligned::<f32>(bytes)),
        (SampleEncoding::PcmFloat, _) => bytemuck::pod_read_unaligned::<f64>(bytes),
    }
}

/// Encode one sample into exactly `format.bytes_per_sample()` bytes
#[inline]
fn encode(format: &AudioFormat, value: f64, out: &mut [u8]) {
    match (format.encoding(), format.bits_per_sample()) {
        (SampleEncoding::PcmInt, 8) => {
            out[0] = (value * SCALE_I8 + SCALE_I8).round().clamp(0.0, 255.0) as u8;
        }
        (SampleEncoding::PcmInt, 16) => {
            let v = (value * SCALE_I16).round().clamp(-SCALE_I16, SCALE_I16 - 1.0) as i16;
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        (SampleEncoding::PcmInt, 24) => {
            let v = (value * SCALE_I24).round().clamp(-SCALE_I24, SCALE_I24 - 1.0) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        (SampleEncoding::PcmInt, 32) => {
            let v = (value * SCALE_I32).round().clamp(-SCALE_I32, SCALE_I32 - 1.0) as i32;
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        (SampleEncoding::PcmInt, _) => {
            // `as` saturates at the i64 bounds
            let v = (value * SCALE_I64).round() as i64;
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        (SampleEncoding::PcmFloat, 32) => {
            let v = value as f32;
            out.copy_from_slice(bytemuck::bytes_of(&v));
        }
        (SampleEncoding::PcmFloat, _) => {
            out.copy_from_slice(bytemuck::bytes_of(&value));
        }
    }
}

#[inline]
fn sample_range(format: &AudioFormat, frame: usize, channel: usize) -> std::ops::Range<usize> {
    let bps = format.bytes_per_sample();
    let start = frame * format.frame_size_bytes() + channel * bps;
    start..start + bps
}

/// Read-only view over one or more frames of packet memory
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioSample<'a> {
    format: Option<AudioFormat>,
    bytes: &'a [u8],
}

impl<'a> AudioSample<'a> {
    /// Outline the frames contained in `bytes`; a trailing partial frame is ignored
    pub fn new(format: AudioFormat, bytes: &'a [u8]) -> Self {
        let whole = format.frames_to_bytes(format.bytes_to_frames(bytes.len()));
        Self {
            format: Some(format),
            bytes: &bytes[..whole],
        }
    }

    /// False for the default placeholder view
    pub fn is_valid(&self) -> bool {
        self.format.is_some()
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.map_or(0, |f| usize::from(f.channels()))
    }

    pub fn frame_count(&self) -> usize {
        self.format.map_or(0, |f| f.bytes_to_frames(self.bytes.len()))
    }

    /// Raw bytes covered by the view
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Value of one channel of one frame
    #[inline]
    pub fn get(&self, frame: usize, channel: usize) -> Option<f64> {
        let format = self.format?;
        if channel >= usize::from(format.channels()) || frame >= self.frame_count() {
            return None;
        }
        Some(decode(&format, &self.bytes[sample_range(&format, frame, channel)]))
    }

    /// Iterate the channel values of one frame
    pub fn frame(&self, index: usize) -> Option<Frame<'a>> {
        let format = self.format?;
        if index >= self.frame_count() {
            return None;
        }
        let size = format.frame_size_bytes();
        let start = index * size;
        let bytes = self.bytes;
        Some(Frame {
            format,
            bytes: &bytes[start..start + size],
            channel: 0,
        })
    }
}

/// Channel values of a single frame
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    format: AudioFormat,
    bytes: &'a [u8],
    channel: usize,
}

impl Iterator for Frame<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.channel >= usize::from(self.format.channels()) {
            return None;
        }
        let value = decode(&self.format, &self.bytes[sample_range(&self.format, 0, self.channel)]);
        self.channel += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::from(self.format.channels()) - self.channel;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Frame<'_> {}

/// Mutable view over one or more frames of packet memory
#[derive(Debug)]
pub struct AudioSampleMut<'a> {
    format: AudioFormat,
    bytes: &'a mut [u8],
}

impl<'a> AudioSampleMut<'a> {
    pub fn new(format: AudioFormat, bytes: &'a mut [u8]) -> Self {
        let whole = format.frames_to_bytes(format.bytes_to_frames(bytes.len()));
        Self {
            format,
            bytes: &mut bytes[..whole],
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frame_count(&self) -> usize {
        self.format.bytes_to_frames(self.bytes.len())
    }

    /// Reborrow as a read-only view
    pub fn as_view(&self) -> AudioSample<'_> {
        AudioSample {
            format: Some(self.format),
            bytes: &*self.bytes,
        }
    }

    #[inline]
    pub fn get(&self, frame: usize, channel: usize) -> Option<f64> {
        self.as_view().get(frame, channel)
    }

    /// Write one channel of one frame; integer encodings clamp to full scale
    ///
    /// Returns false when `frame` or `channel` is outside the view.
    #[inline]
    pub fn set(&mut self, frame: usize, channel: usize, value: f64) -> bool {
        if channel >= usize::from(self.format.channels()) || frame >= self.frame_count() {
            return false;
        }
        let range = sample_range(&self.format, frame, channel);
        encode(&self.format, value, &mut self.bytes[range]);
        true
    }

    /// Copy frames from another view with the same layout
    ///
    /// No conversion is performed: channel count, width and encoding must
    /// match. Copies as many frames as both views hold and returns that count.
    pub fn copy_from(&mut self, source: &AudioSample<'_>) -> PacketResult<usize> {
        let Some(src_format) = source.format() else {
            return Err(PacketError::MissingFormat);
        };
        if src_format.channels() != self.format.channels()
            || src_format.bits_per_sample() != self.format.bits_per_sample()
            || src_format.encoding() != self.format.encoding()
        {
            return Err(PacketError::FormatMismatch {
                expected: self.format,
                actual: src_format,
            });
        }

        let frames = self.frame_count().min(source.frame_count());
        let bytes = self.format.frames_to_bytes(frames);
        self.bytes[..bytes].copy_from_slice(&source.as_bytes()[..bytes]);
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_i16() -> AudioFormat {
        AudioFormat::pcm_i16(2, 48000).unwrap()
    }

    #[test]
    fn test_default_view_is_placeholder() {
        let view = AudioSample::default();
        assert!(!view.is_valid());
        assert_eq!(view.frame_count(), 0);
        assert_eq!(view.get(0, 0), None);
    }

    #[test]
    fn test_i16_read_write() {
        let format = stereo_i16();
        let mut bytes = [0u8; 8];
        {
            let mut view = AudioSampleMut::new(format, &mut bytes);
            assert_eq!(view.frame_count(), 2);
            assert!(view.set(0, 0, 0.5));
            assert!(view.set(1, 1, -1.0));
            assert!(!view.set(2, 0, 0.0));
            assert!(!view.set(0, 2, 0.0));
        }

        let view = AudioSample::new(format, &bytes);
        assert_eq!(view.get(0, 0), Some(0.5));
        assert_eq!(view.get(0, 1), Some(0.0));
        assert_eq!(view.get(1, 1), Some(-1.0));
        assert_eq!(view.get(2, 0), None);
    }

    #[test]
    fn test_int_clamps_full_scale() {
        let format = AudioFormat::pcm_i16(1, 48000).unwrap();
        let mut bytes = [0u8; 2];
        AudioSampleMut::new(format, &mut bytes).set(0, 0, 4.0);
        let value = AudioSample::new(format, &bytes).get(0, 0).unwrap();
        assert!((value - 32767.0 / 32768.0).abs() < 1e-12);
    }

    #[test]
    fn test_u8_is_offset_binary() {
        let format = AudioFormat::new(1, 8000, 8, SampleEncoding::PcmInt).unwrap();
        let bytes = [0x80u8, 0x00, 0xC0];
        let view = AudioSample::new(format, &bytes);
        assert_eq!(view.get(0, 0), Some(0.0));
        assert_eq!(view.get(1, 0), Some(-1.0));
        assert_eq!(view.get(2, 0), Some(0.5));
    }

    #[test]
    fn test_i24_sign_extension() {
        let format = AudioFormat::new(1, 48000, 24, SampleEncoding::PcmInt).unwrap();
        let mut bytes = [0u8; 6];
        {
            let mut view = AudioSampleMut::new(format, &mut bytes);
            view.set(0, 0, -0.5);
            view.set(1, 0, 0.25);
        }
        // -0.5 * 2^23 = -4194304 = 0xC00000
        assert_eq!(&bytes[..3], &[0x00, 0x00, 0xC0]);
        let view = AudioSample::new(format, &bytes);
        assert_eq!(view.get(0, 0), Some(-0.5));
        assert_eq!(view.get(1, 0), Some(0.25));
    }

    #[test]
    fn test_float_passthrough() {
        let format = AudioFormat::pcm_f32(2, 44100).unwrap();
        let samples = [0.25f32, -0.75, 1.5, 0.0];
        let view = AudioSample::new(format, bytemuck::cast_slice(&samples));
        assert_eq!(view.frame_count(), 2);
        let frame: Vec<f64> = view.frame(1).unwrap().collect();
        assert_eq!(frame, vec![1.5, 0.0]);
    }

    #[test]
    fn test_partial_trailing_frame_ignored() {
        let format = stereo_i16();
        let bytes = [0u8; 10];
        assert_eq!(AudioSample::new(format, &bytes).frame_count(), 2);
    }

    #[test]
    fn test_copy_from_requires_matching_layout() {
        let format = stereo_i16();
        let src_bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst_bytes = [0u8; 4];

        let source = AudioSample::new(format, &src_bytes);
        let mut dest = AudioSampleMut::new(format, &mut dst_bytes);
        assert_eq!(dest.copy_from(&source), Ok(1));
        assert_eq!(dst_bytes, [1, 2, 3, 4]);

        let mono = AudioFormat::pcm_i16(1, 48000).unwrap();
        let mut other = [0u8; 4];
        let mut dest = AudioSampleMut::new(mono, &mut other);
        assert!(matches!(
            dest.copy_from(&source),
            Err(PacketError::FormatMismatch { .. })
        ));
    }
}
