//! AudioPacket - the owned unit of audio exchanged between stages
//!
//! A packet owns a fixed-capacity byte buffer, the number of valid payload
//! bytes, and an optional [`AudioFormat`] tag. Packets are moved (never
//! shared) between threads; the barrier hands ownership from producer to
//! consumer without copying the payload.
//!
//! # Invariants
//!
//! - `len() <= capacity()`
//! - With a format attached, `len()` is a whole number of frames
//!
//! Every fallible operation checks its preconditions before touching the
//! buffer, so a failed call leaves the packet unchanged.

use super::error::{PacketError, PacketResult};
use super::format::AudioFormat;
use super::sample::{AudioSample, AudioSampleMut};

/// Capacity used by [`AudioPacket::new`] (bytes)
///
/// 4096 bytes = 1024 stereo 16-bit frames (~21ms at 48kHz)
pub const DEFAULT_PACKET_CAPACITY: usize = 4096;

/// Owned, fixed-capacity audio buffer tagged with a format
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AudioPacket {
    /// Backing storage; `buffer.len()` is the capacity
    buffer: Vec<u8>,
    /// Valid payload bytes
    size: usize,
    format: Option<AudioFormat>,
}

impl AudioPacket {
    /// Raw-byte packet with [`DEFAULT_PACKET_CAPACITY`] and no format
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PACKET_CAPACITY)
    }

    /// Empty packet with no storage (does not allocate)
    pub const fn empty() -> Self {
        Self {
            buffer: Vec::new(),
            size: 0,
            format: None,
        }
    }

    /// Raw-byte packet with `capacity` zeroed bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            size: 0,
            format: None,
        }
    }

    /// Packet tagged with `format`; capacity is rounded up to whole frames
    pub fn with_format(format: AudioFormat, capacity: usize) -> Self {
        let frame = format.frame_size_bytes();
        let capacity = capacity.div_ceil(frame) * frame;
        Self {
            buffer: vec![0; capacity],
            size: 0,
            format: Some(format),
        }
    }

    /// Packet sized for exactly `frames` frames of `format`
    pub fn with_frames(format: AudioFormat, frames: usize) -> Self {
        Self::with_format(format, format.frames_to_bytes(frames))
    }

    /// Move the buffer out, leaving `self` empty (capacity 0, no format)
    #[inline]
    pub fn take(&mut self) -> AudioPacket {
        std::mem::take(self)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Valid payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// True when a format is attached and storage exists
    pub fn is_valid(&self) -> bool {
        self.format.is_some() && !self.buffer.is_empty()
    }

    /// Attach a format; the current payload must be frame-aligned for it
    pub fn set_format(&mut self, format: AudioFormat) -> PacketResult<()> {
        check_aligned(Some(format), self.size)?;
        self.format = Some(format);
        Ok(())
    }

    /// Detach the format, turning the packet back into raw bytes
    pub fn clear_format(&mut self) {
        self.format = None;
    }

    /// Whole frames in the payload (0 for raw packets)
    pub fn frame_count(&self) -> usize {
        self.format.map_or(0, |f| f.bytes_to_frames(self.size))
    }

    /// Valid payload
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.size]
    }

    /// Valid payload, writable
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..self.size]
    }

    /// Entire backing buffer regardless of payload length
    #[inline]
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Set the payload length (e.g. after writing through [`storage_mut`](Self::storage_mut))
    pub fn set_len(&mut self, len: usize) -> PacketResult<()> {
        if len > self.capacity() {
            return Err(PacketError::OutOfRange {
                offset: 0,
                len,
                capacity: self.capacity(),
            });
        }
        check_aligned(self.format, len)?;
        self.size = len;
        Ok(())
    }

    /// Mark the payload empty without touching storage
    #[inline]
    pub fn clear(&mut self) {
        self.size = 0;
    }

    /// Overwrite the payload with the format's silence value
    pub fn fill_silence(&mut self) {
        let byte = self.format.map_or(0, |f| f.silence_byte());
        self.buffer[..self.size].fill(byte);
    }

    /// Copy `data` into the buffer starting at `offset`
    ///
    /// The payload grows to `offset + data.len()` if that is past the current
    /// length. Fails without modifying anything if the range exceeds the
    /// capacity or would leave a partial frame.
    pub fn assign(&mut self, data: &[u8], offset: usize) -> PacketResult<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.capacity())
            .ok_or(PacketError::OutOfRange {
                offset,
                len: data.len(),
                capacity: self.capacity(),
            })?;

        let new_size = self.size.max(end);
        check_aligned(self.format, new_size)?;

        self.buffer[offset..end].copy_from_slice(data);
        self.size = new_size;
        Ok(())
    }

    /// Take ownership of an externally allocated buffer without copying
    ///
    /// The whole buffer becomes the payload. The previous buffer is handed
    /// back so real-time callers can recycle it instead of freeing it.
    pub fn assign_owned(&mut self, buffer: Vec<u8>) -> PacketResult<Vec<u8>> {
        check_aligned(self.format, buffer.len())?;
        self.size = buffer.len();
        Ok(std::mem::replace(&mut self.buffer, buffer))
    }

    /// Bounds-checked byte access within the payload
    pub fn at(&self, index: usize) -> PacketResult<u8> {
        self.as_bytes()
            .get(index)
            .copied()
            .ok_or(PacketError::IndexOutOfRange {
                index,
                size: self.size,
            })
    }

    /// Typed view over the whole payload
    pub fn sample_view(&self) -> PacketResult<AudioSample<'_>> {
        let format = self.format.ok_or(PacketError::MissingFormat)?;
        Ok(AudioSample::new(format, self.as_bytes()))
    }

    /// Writable typed view over the whole payload
    pub fn sample_view_mut(&mut self) -> PacketResult<AudioSampleMut<'_>> {
        let format = self.format.ok_or(PacketError::MissingFormat)?;
        Ok(AudioSampleMut::new(format, self.as_bytes_mut()))
    }

    /// Typed view over a single frame
    pub fn frame(&self, index: usize) -> PacketResult<AudioSample<'_>> {
        let format = self.format.ok_or(PacketError::MissingFormat)?;
        let size = format.frame_size_bytes();
        let end = index
            .checked_mul(size)
            .and_then(|start| start.checked_add(size))
            .filter(|&end| end <= self.size);
        match end {
            Some(end) => Ok(AudioSample::new(format, &self.buffer[end - size..end])),
            None => Err(PacketError::IndexOutOfRange {
                index: index.saturating_mul(size),
                size: self.size,
            }),
        }
    }
}

impl Clone for AudioPacket {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            size: self.size,
            format: self.format,
        }
    }

    /// Deep copy that reuses the existing allocation when it is big enough
    fn clone_from(&mut self, source: &Self) {
        if self.buffer.len() < source.buffer.len() {
            self.buffer.resize(source.buffer.len(), 0);
        }
        self.buffer[..source.size].copy_from_slice(source.as_bytes());
        self.size = source.size;
        self.format = source.format;
    }
}

#[inline]
fn check_aligned(format: Option<AudioFormat>, size: usize) -> PacketResult<()> {
    match format {
        Some(f) if size % f.frame_size_bytes() != 0 => Err(PacketError::Misaligned {
            size,
            frame_size: f.frame_size_bytes(),
        }),
        _ => Ok(()),
    }
}

/// Bytes needed to hold `input` after conversion to `out_format`
///
/// Scales by the sample-rate ratio and the frame-size ratio, rounded down to
/// whole output frames. Raw (unformatted) input is assumed to already be in
/// `out_format`.
pub fn determine_buffer_size(input: &AudioPacket, out_format: &AudioFormat) -> usize {
    let Some(in_format) = input.format() else {
        return out_format.frames_to_bytes(out_format.bytes_to_frames(input.len()));
    };

    let in_frames = input.frame_count() as u64;
    let out_frames =
        in_frames * u64::from(out_format.sample_rate()) / u64::from(in_format.sample_rate());
    out_format.frames_to_bytes(out_frames as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_i16() -> AudioFormat {
        AudioFormat::pcm_i16(2, 48000).unwrap()
    }

    #[test]
    fn test_default_capacity() {
        let packet = AudioPacket::new();
        assert_eq!(packet.capacity(), DEFAULT_PACKET_CAPACITY);
        assert!(packet.is_empty());
        assert_eq!(packet.format(), None);
        assert!(!packet.is_valid());
    }

    #[test]
    fn test_capacity_rounds_up_to_frames() {
        let packet = AudioPacket::with_format(stereo_i16(), 10);
        assert_eq!(packet.capacity(), 12);
        assert!(packet.is_valid());
    }

    #[test]
    fn test_assign_then_read_back() {
        let mut packet = AudioPacket::with_capacity(16);
        let data = [9u8, 8, 7, 6, 5];
        packet.assign(&data, 3).unwrap();

        assert_eq!(packet.len(), 8);
        for (i, &byte) in data.iter().enumerate() {
            assert_eq!(packet.at(3 + i), Ok(byte));
        }
        assert_eq!(&packet.as_bytes()[3..8], &data);
    }

    #[test]
    fn test_assign_keeps_larger_size() {
        let mut packet = AudioPacket::with_capacity(16);
        packet.assign(&[1; 12], 0).unwrap();
        packet.assign(&[2; 2], 0).unwrap();
        assert_eq!(packet.len(), 12);
        assert_eq!(packet.as_bytes()[..3], [2, 2, 1]);
    }

    #[test]
    fn test_assign_out_of_range_leaves_packet_unchanged() {
        let mut packet = AudioPacket::with_capacity(8);
        packet.assign(&[1, 2, 3, 4], 0).unwrap();
        let before = packet.clone();

        let err = packet.assign(&[0xFF; 4], 6).unwrap_err();
        assert_eq!(
            err,
            PacketError::OutOfRange {
                offset: 6,
                len: 4,
                capacity: 8
            }
        );
        assert_eq!(packet, before);

        // offset overflow must not wrap
        assert!(packet.assign(&[1], usize::MAX).is_err());
        assert_eq!(packet, before);
    }

    #[test]
    fn test_assign_misaligned_rejected() {
        let mut packet = AudioPacket::with_format(stereo_i16(), 16);
        assert!(matches!(
            packet.assign(&[1, 2, 3], 0),
            Err(PacketError::Misaligned {
                size: 3,
                frame_size: 4
            })
        ));
        assert!(packet.is_empty());
        packet.assign(&[1, 2, 3, 4], 0).unwrap();
        assert_eq!(packet.frame_count(), 1);
    }

    #[test]
    fn test_at_bounds() {
        let mut packet = AudioPacket::with_capacity(8);
        packet.assign(&[42], 0).unwrap();
        assert_eq!(packet.at(0), Ok(42));
        // capacity is 8 but only 1 byte is valid
        assert_eq!(
            packet.at(1),
            Err(PacketError::IndexOutOfRange { index: 1, size: 1 })
        );
    }

    #[test]
    fn test_take_leaves_source_empty() {
        let mut source = AudioPacket::with_format(stereo_i16(), 8);
        source.assign(&[1, 2, 3, 4, 5, 6, 7, 8], 0).unwrap();

        let moved = source.take();
        assert_eq!(source.capacity(), 0);
        assert_eq!(source.len(), 0);
        assert_eq!(source.format(), None);
        assert_eq!(moved.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(moved.format(), Some(stereo_i16()));

        // the emptied source is still usable
        assert!(source.assign(&[1], 0).is_err());
        source = AudioPacket::with_capacity(2);
        source.assign(&[1], 0).unwrap();
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = AudioPacket::with_capacity(4);
        original.assign(&[1, 2, 3, 4], 0).unwrap();

        let mut copy = original.clone();
        copy.assign(&[9], 0).unwrap();
        assert_eq!(original.as_bytes(), &[1, 2, 3, 4]);

        original.assign(&[7], 3).unwrap();
        assert_eq!(copy.as_bytes(), &[9, 2, 3, 4]);
    }

    #[test]
    fn test_clone_from_reuses_buffer() {
        let mut source = AudioPacket::with_format(stereo_i16(), 8);
        source.assign(&[1, 2, 3, 4], 0).unwrap();

        let mut dest = AudioPacket::with_capacity(64);
        dest.clone_from(&source);
        assert_eq!(dest.capacity(), 64);
        assert_eq!(dest.as_bytes(), source.as_bytes());
        assert_eq!(dest.format(), source.format());
    }

    #[test]
    fn test_assign_owned_swaps_buffers() {
        let mut packet = AudioPacket::with_capacity(4);
        let previous = packet.assign_owned(vec![5, 6, 7]).unwrap();
        assert_eq!(previous.len(), 4);
        assert_eq!(packet.capacity(), 3);
        assert_eq!(packet.as_bytes(), &[5, 6, 7]);

        let mut formatted = AudioPacket::with_format(stereo_i16(), 4);
        assert!(formatted.assign_owned(vec![0; 6]).is_err());
        assert_eq!(formatted.capacity(), 4);
    }

    #[test]
    fn test_set_format_checks_alignment() {
        let mut packet = AudioPacket::with_capacity(8);
        packet.assign(&[0; 6], 0).unwrap();
        assert!(packet.set_format(stereo_i16()).is_err());
        packet.set_len(4).unwrap();
        packet.set_format(stereo_i16()).unwrap();
        assert_eq!(packet.frame_count(), 1);
    }

    #[test]
    fn test_frame_view() {
        let mut packet = AudioPacket::with_frames(stereo_i16(), 2);
        packet.set_len(8).unwrap();
        {
            let mut view = packet.sample_view_mut().unwrap();
            view.set(1, 0, 0.5);
        }
        let frame = packet.frame(1).unwrap();
        assert_eq!(frame.get(0, 0), Some(0.5));
        assert!(packet.frame(2).is_err());
    }

    #[test]
    fn test_frame_index_overflow() {
        let mut packet = AudioPacket::with_frames(stereo_i16(), 2);
        packet.set_len(8).unwrap();
        assert_eq!(
            packet.frame(usize::MAX).unwrap_err(),
            PacketError::IndexOutOfRange {
                index: usize::MAX,
                size: 8,
            }
        );
        assert!(packet.frame(usize::MAX / 4 + 1).is_err());
        assert!(packet.frame(1).is_ok());
    }

    #[test]
    fn test_fill_silence_u8() {
        let format =
            AudioFormat::new(1, 8000, 8, crate::packet::SampleEncoding::PcmInt).unwrap();
        let mut packet = AudioPacket::with_format(format, 4);
        packet.set_len(4).unwrap();
        packet.fill_silence();
        assert_eq!(packet.as_bytes(), &[0x80; 4]);
    }

    #[test]
    fn test_determine_buffer_size() {
        let input_format = AudioFormat::pcm_i16(2, 48000).unwrap();
        let mut input = AudioPacket::with_frames(input_format, 480);
        input.set_len(input_format.frames_to_bytes(480)).unwrap();

        // 48k stereo i16 -> 24k mono f32: half the frames, same bytes per frame
        let out_format = AudioFormat::pcm_f32(1, 24000).unwrap();
        assert_eq!(determine_buffer_size(&input, &out_format), 240 * 4);

        // 48k -> 44.1k rounds down to whole frames
        let out_format = AudioFormat::pcm_i16(2, 44100).unwrap();
        assert_eq!(determine_buffer_size(&input, &out_format), 441 * 4);
    }
}
