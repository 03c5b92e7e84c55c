//! Several filters run back to back inside one stage

use super::{copy_packet, Filter, FilterInfo, FilterKind, FilterResult};
use crate::packet::{AudioFormat, AudioPacket};

/// Ordered list of filters applied as one
///
/// Intermediate results go through two scratch packets sized by
/// [`prepare`](Self::prepare), so a prepared chain does not allocate while
/// processing. An empty chain copies its input.
pub struct FilterChain {
    info: FilterInfo,
    filters: Vec<Box<dyn Filter>>,
    scratch: [AudioPacket; 2],
}

impl FilterChain {
    pub const NAME: &'static str = "chain";

    pub fn new() -> Self {
        Self {
            info: FilterInfo::new(Self::NAME, FilterKind::Unknown),
            filters: Vec::new(),
            scratch: [AudioPacket::empty(), AudioPacket::empty()],
        }
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.info.kind = self.info.kind.combine(filter.info().kind);
        self.filters.push(filter);
    }

    pub fn with(mut self, filter: Box<dyn Filter>) -> Self {
        self.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the filters in order
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.info().name.as_str()).collect()
    }

    /// Size scratch buffers for inputs of up to `max_input_bytes` in `input`
    ///
    /// Returns the chain's output format.
    pub fn prepare(&mut self, input: AudioFormat, max_input_bytes: usize) -> FilterResult<AudioFormat> {
        let mut format = input;
        let mut frames = input.bytes_to_frames(max_input_bytes) as u64;
        let mut largest = 0;

        for filter in &self.filters {
            let next = filter.output_format(&format)?;
            frames = frames * u64::from(next.sample_rate()) / u64::from(format.sample_rate());
            largest = largest.max(next.frames_to_bytes(frames as usize));
            format = next;
        }

        for packet in &mut self.scratch {
            if packet.capacity() < largest {
                *packet = AudioPacket::with_capacity(largest);
            }
        }
        log::debug!(
            "Filter chain {:?} prepared: {} -> {}, scratch {} bytes",
            self.names(),
            input,
            format,
            largest
        );
        Ok(format)
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FilterChain {
    fn info(&self) -> &FilterInfo {
        &self.info
    }

    fn output_format(&self, input: &AudioFormat) -> FilterResult<AudioFormat> {
        self.filters
            .iter()
            .try_fold(*input, |format, filter| filter.output_format(&format))
    }

    fn transform(&mut self, input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()> {
        let Some((first, rest)) = self.filters.split_first_mut() else {
            return copy_packet(input, output);
        };
        let Some((last, middle)) = rest.split_last_mut() else {
            return first.transform(input, output);
        };

        let [a, b] = &mut self.scratch;
        let (mut current, mut spare) = (a, b);
        first.transform(input, current)?;
        for filter in middle {
            filter.transform(current, spare)?;
            std::mem::swap(&mut current, &mut spare);
        }
        last.transform(current, output)
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::native::{ChannelMap, Gain, NearestResampler};

    #[test]
    fn test_empty_chain_copies() {
        let mut chain = FilterChain::new();
        let mut input = AudioPacket::with_capacity(2);
        input.assign(&[1, 2], 0).unwrap();
        let mut output = AudioPacket::with_capacity(2);
        chain.transform(&input, &mut output).unwrap();
        assert_eq!(output.as_bytes(), &[1, 2]);
    }

    #[test]
    fn test_chain_kind_and_format() {
        let chain = FilterChain::new()
            .with(Box::new(Gain::new(0.5).unwrap()))
            .with(Box::new(NearestResampler::new(24000).unwrap()))
            .with(Box::new(ChannelMap::new(1).unwrap()));

        assert_eq!(chain.info().kind, FilterKind::FrequencyAndChannelTransform);
        assert_eq!(chain.names(), vec!["gain", "resample", "channel-map"]);

        let input = AudioFormat::pcm_f32(2, 48000).unwrap();
        assert_eq!(
            chain.output_format(&input).unwrap(),
            AudioFormat::pcm_f32(1, 24000).unwrap()
        );
    }

    #[test]
    fn test_chain_runs_in_order() {
        let format = AudioFormat::pcm_f32(2, 48000).unwrap();
        let mut chain = FilterChain::new()
            .with(Box::new(Gain::new(0.5).unwrap()))
            .with(Box::new(NearestResampler::new(24000).unwrap()))
            .with(Box::new(ChannelMap::new(1).unwrap()));
        let out_format = chain.prepare(format, format.frames_to_bytes(4)).unwrap();

        let samples = [1.0f32, 0.5, 9.0, 9.0, -1.0, 0.0, 9.0, 9.0];
        let mut input = AudioPacket::with_frames(format, 4);
        input.assign(bytemuck::cast_slice(&samples), 0).unwrap();

        let mut output = AudioPacket::with_frames(out_format, 2);
        chain.transform(&input, &mut output).unwrap();

        let view = output.sample_view().unwrap();
        assert_eq!(view.frame_count(), 2);
        assert_eq!(view.get(0, 0), Some(0.375));
        assert_eq!(view.get(1, 0), Some(-0.25));
    }
}
