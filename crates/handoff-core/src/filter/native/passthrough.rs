//! Passthrough filter - copies packets unchanged

use crate::filter::{copy_packet, Filter, FilterInfo, FilterKind, FilterResult};
use crate::packet::{AudioFormat, AudioPacket};

/// Copies input to output byte for byte
pub struct Passthrough {
    info: FilterInfo,
}

impl Passthrough {
    pub const NAME: &'static str = "passthrough";

    pub fn new() -> Self {
        Self {
            info: FilterInfo::new(Self::NAME, FilterKind::Unknown),
        }
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Passthrough {
    fn info(&self) -> &FilterInfo {
        &self.info
    }

    fn output_format(&self, input: &AudioFormat) -> FilterResult<AudioFormat> {
        Ok(*input)
    }

    fn transform(&mut self, input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()> {
        copy_packet(input, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copies_raw_and_formatted() {
        let mut filter = Passthrough::new();
        let mut output = AudioPacket::with_capacity(16);

        let mut raw = AudioPacket::with_capacity(3);
        raw.assign(&[1, 2, 3], 0).unwrap();
        filter.transform(&raw, &mut output).unwrap();
        assert_eq!(output.as_bytes(), &[1, 2, 3]);
        assert_eq!(output.format(), None);

        let format = AudioFormat::pcm_i16(1, 8000).unwrap();
        let mut formatted = AudioPacket::with_format(format, 4);
        formatted.assign(&[5, 6, 7, 8], 0).unwrap();
        filter.transform(&formatted, &mut output).unwrap();
        assert_eq!(output.as_bytes(), &[5, 6, 7, 8]);
        assert_eq!(output.format(), Some(format));
    }
}
