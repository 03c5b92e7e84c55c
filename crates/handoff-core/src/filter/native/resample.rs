//! Nearest-neighbour sample rate conversion
//!
//! Output frame `i` is input frame `floor(i * in_rate / out_rate)`. No
//! interpolation and no anti-aliasing, so it is cheap and bit-exact for
//! equal rates, but aliases when downsampling. Frames are copied as raw
//! bytes, so any width and encoding is supported.

use crate::filter::{copy_packet, prepare_output, Filter, FilterError, FilterInfo, FilterKind, FilterResult};
use crate::packet::{AudioFormat, AudioPacket, PacketError};

pub struct NearestResampler {
    info: FilterInfo,
    target_rate: u32,
}

impl NearestResampler {
    pub const NAME: &'static str = "resample";

    pub fn new(target_rate: u32) -> FilterResult<Self> {
        if target_rate == 0 {
            return Err(FilterError::InvalidParam {
                filter: Self::NAME.to_string(),
                param: "sample_rate".to_string(),
                value: 0.0,
            });
        }
        Ok(Self {
            info: FilterInfo::new(Self::NAME, FilterKind::FrequencyTransform),
            target_rate,
        })
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

impl Filter for NearestResampler {
    fn info(&self) -> &FilterInfo {
        &self.info
    }

    fn output_format(&self, input: &AudioFormat) -> FilterResult<AudioFormat> {
        Ok(AudioFormat::new(
            input.channels(),
            self.target_rate,
            input.bits_per_sample(),
            input.encoding(),
        )?)
    }

    fn transform(&mut self, input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()> {
        let in_format = input.format().ok_or(PacketError::MissingFormat)?;
        if in_format.sample_rate() == self.target_rate {
            return copy_packet(input, output);
        }

        let out_format = self.output_format(&in_format)?;
        let in_rate = u64::from(in_format.sample_rate());
        let out_rate = u64::from(self.target_rate);
        let in_frames = input.frame_count() as u64;
        let out_frames = (in_frames * out_rate / in_rate) as usize;

        prepare_output(output, out_format, out_frames)?;

        let frame = in_format.frame_size_bytes();
        let src = input.as_bytes();
        let dst = output.as_bytes_mut();
        for (i, out) in dst.chunks_exact_mut(frame).enumerate() {
            let j = (i as u64 * in_rate / out_rate) as usize;
            out.copy_from_slice(&src[j * frame..(j + 1) * frame]);
        }
        Ok(())
    }
}
