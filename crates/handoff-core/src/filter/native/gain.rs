//! Gain filter - linear volume scaling

use crate::filter::{copy_packet, Filter, FilterError, FilterInfo, FilterKind, FilterResult};
use crate::packet::{AudioFormat, AudioPacket, PacketError};

/// Scales every sample by a constant factor
///
/// Integer output clamps at full scale. A gain of 1.0 is a byte copy.
pub struct Gain {
    info: FilterInfo,
    gain: f64,
}

impl Gain {
    pub const NAME: &'static str = "gain";

    pub fn new(gain: f64) -> FilterResult<Self> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(FilterError::InvalidParam {
                filter: Self::NAME.to_string(),
                param: "gain".to_string(),
                value: gain,
            });
        }
        Ok(Self {
            info: FilterInfo::new(Self::NAME, FilterKind::Effects),
            gain,
        })
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }
}

impl Filter for Gain {
    fn info(&self) -> &FilterInfo {
        &self.info
    }

    fn output_format(&self, input: &AudioFormat) -> FilterResult<AudioFormat> {
        Ok(*input)
    }

    fn transform(&mut self, input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()> {
        if input.format().is_none() {
            return Err(PacketError::MissingFormat.into());
        }
        copy_packet(input, output)?;
        if self.gain == 1.0 {
            return Ok(());
        }

        let mut view = output.sample_view_mut()?;
        let channels = usize::from(view.format().channels());
        for frame in 0..view.frame_count() {
            for channel in 0..channels {
                if let Some(value) = view.get(frame, channel) {
                    view.set(frame, channel, value * self.gain);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_float() {
        let format = AudioFormat::pcm_f32(2, 48000).unwrap();
        let mut input = AudioPacket::with_frames(format, 2);
        let samples = [0.5f32, -0.5, 1.0, 0.25];
        input.assign(bytemuck::cast_slice(&samples), 0).unwrap();

        let mut output = AudioPacket::with_frames(format, 2);
        Gain::new(0.5).unwrap().transform(&input, &mut output).unwrap();

        let view = output.sample_view().unwrap();
        assert_eq!(view.get(0, 0), Some(0.25));
        assert_eq!(view.get(0, 1), Some(-0.25));
        assert_eq!(view.get(1, 0), Some(0.5));
        assert_eq!(view.get(1, 1), Some(0.125));
    }

    #[test]
    fn test_int_clamps() {
        let format = AudioFormat::pcm_i16(1, 48000).unwrap();
        let mut input = AudioPacket::with_frames(format, 1);
        input.assign(bytemuck::bytes_of(&16384i16), 0).unwrap();

        let mut output = AudioPacket::with_frames(format, 1);
        Gain::new(4.0).unwrap().transform(&input, &mut output).unwrap();
        let value: i16 = bytemuck::pod_read_unaligned(output.as_bytes());
        assert_eq!(value, i16::MAX);
    }

    #[test]
    fn test_rejects_invalid_gain() {
        assert!(Gain::new(-1.0).is_err());
        assert!(Gain::new(f64::NAN).is_err());
    }
}
