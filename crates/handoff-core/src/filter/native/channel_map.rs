//! Channel layout conversion
//!
//! - N → 1: average of all input channels
//! - 1 → N: the mono channel copied to every output
//! - N → M otherwise: output channel `c` takes input channel `c % N`

use crate::filter::{copy_packet, prepare_output, Filter, FilterError, FilterInfo, FilterKind, FilterResult};
use crate::packet::{AudioFormat, AudioPacket, AudioSampleMut, PacketError};

pub struct ChannelMap {
    info: FilterInfo,
    channels: u16,
}

impl ChannelMap {
    pub const NAME: &'static str = "channel-map";

    pub fn new(channels: u16) -> FilterResult<Self> {
        if channels == 0 {
            return Err(FilterError::InvalidParam {
                filter: Self::NAME.to_string(),
                param: "channels".to_string(),
                value: 0.0,
            });
        }
        Ok(Self {
            info: FilterInfo::new(Self::NAME, FilterKind::ChannelTransform),
            channels,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Filter for ChannelMap {
    fn info(&self) -> &FilterInfo {
        &self.info
    }

    fn output_format(&self, input: &AudioFormat) -> FilterResult<AudioFormat> {
        Ok(AudioFormat::new(
            self.channels,
            input.sample_rate(),
            input.bits_per_sample(),
            input.encoding(),
        )?)
    }

    fn transform(&mut self, input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()> {
        let in_format = input.format().ok_or(PacketError::MissingFormat)?;
        if in_format.channels() == self.channels {
            return copy_packet(input, output);
        }

        let out_format = self.output_format(&in_format)?;
        let frames = input.frame_count();
        prepare_output(output, out_format, frames)?;

        let source = input.sample_view()?;
        let mut dest = AudioSampleMut::new(out_format, output.as_bytes_mut());
        let in_channels = usize::from(in_format.channels());
        let out_channels = usize::from(self.channels);

        for frame in 0..frames {
            if out_channels == 1 {
                let sum: f64 = (0..in_channels)
                    .filter_map(|c| source.get(frame, c))
                    .sum();
                dest.set(frame, 0, sum / in_channels as f64);
                continue;
            }
            for c in 0..out_channels {
                if let Some(value) = source.get(frame, c % in_channels) {
                    dest.set(frame, c, value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_f32(channels: u16, samples: &[f32]) -> AudioPacket {
        let format = AudioFormat::pcm_f32(channels, 48000).unwrap();
        let mut packet = AudioPacket::with_format(format, samples.len() * 4);
        packet.assign(bytemuck::cast_slice(samples), 0).unwrap();
        packet
    }

    fn read_f32(packet: &AudioPacket) -> Vec<f32> {
        packet
            .as_bytes()
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect()
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let input = packet_f32(2, &[0.5, 0.25, -1.0, 1.0]);
        let mut output = AudioPacket::with_capacity(64);
        ChannelMap::new(1).unwrap().transform(&input, &mut output).unwrap();

        assert_eq!(read_f32(&output), vec![0.375, 0.0]);
        assert_eq!(output.format().unwrap().channels(), 1);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let input = packet_f32(1, &[0.5, -0.5]);
        let mut output = AudioPacket::with_capacity(64);
        ChannelMap::new(2).unwrap().transform(&input, &mut output).unwrap();

        assert_eq!(read_f32(&output), vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_same_layout_copies() {
        let input = packet_f32(2, &[0.1, 0.2]);
        let mut output = AudioPacket::with_capacity(64);
        ChannelMap::new(2).unwrap().transform(&input, &mut output).unwrap();
        assert_eq!(output.as_bytes(), input.as_bytes());
    }

    #[test]
    fn test_quad_to_stereo_keeps_front() {
        let input = packet_f32(4, &[0.1, 0.2, 0.3, 0.4]);
        let mut output = AudioPacket::with_capacity(64);
        ChannelMap::new(2).unwrap().transform(&input, &mut output).unwrap();
        assert_eq!(read_f32(&output), vec![0.1, 0.2]);
    }
}
