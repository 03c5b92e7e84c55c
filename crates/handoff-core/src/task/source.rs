//! Sine tone generator for running a pipeline without a capture device

use std::f64::consts::TAU;

use super::{PacketSource, StepOutcome, TaskResult};
use crate::packet::{AudioFormat, AudioPacket};

/// Produces a continuous sine wave, one packet per [`fill`](PacketSource::fill)
pub struct ToneSource {
    format: AudioFormat,
    frequency: f64,
    amplitude: f64,
    frames_per_packet: usize,
    phase: f64,
    limit: Option<u64>,
    produced: u64,
}

impl ToneSource {
    pub fn new(format: AudioFormat, frequency: f64, amplitude: f64, frames_per_packet: usize) -> Self {
        Self {
            format,
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            frames_per_packet: frames_per_packet.max(1),
            phase: 0.0,
            limit: None,
            produced: 0,
        }
    }

    /// Stop after `packets` packets
    pub fn with_limit(mut self, packets: u64) -> Self {
        self.limit = Some(packets);
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl PacketSource for ToneSource {
    fn name(&self) -> &str {
        "tone"
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn fill(&mut self, packet: &mut AudioPacket) -> TaskResult<StepOutcome> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(StepOutcome::Finished);
        }

        let capacity_frames = self.format.bytes_to_frames(packet.capacity());
        let frames = self.frames_per_packet.min(capacity_frames);
        packet.set_len(self.format.frames_to_bytes(frames))?;

        let step = TAU * self.frequency / f64::from(self.format.sample_rate());
        let channels = usize::from(self.format.channels());
        let mut view = packet.sample_view_mut()?;
        for frame in 0..frames {
            let value = self.amplitude * self.phase.sin();
            for channel in 0..channels {
                view.set(frame, channel, value);
            }
            self.phase = (self.phase + step) % TAU;
        }

        self.produced += 1;
        Ok(StepOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_fills_packet() {
        let format = AudioFormat::pcm_f32(2, 48000).unwrap();
        let mut source = ToneSource::new(format, 12000.0, 0.5, 4);
        let mut packet = AudioPacket::with_frames(format, 8);

        assert_eq!(source.fill(&mut packet).unwrap(), StepOutcome::Processed);
        assert_eq!(packet.frame_count(), 4);

        // quarter-period steps: 0, 1, 0, -1
        let view = packet.sample_view().unwrap();
        let left: Vec<f64> = (0..4).map(|f| view.get(f, 0).unwrap()).collect();
        assert!(left[0].abs() < 1e-6);
        assert!((left[1] - 0.5).abs() < 1e-6);
        assert!(left[2].abs() < 1e-6);
        assert!((left[3] + 0.5).abs() < 1e-6);
        assert_eq!(view.get(1, 1), view.get(1, 0));
    }

    #[test]
    fn test_tone_limit() {
        let format = AudioFormat::pcm_i16(1, 8000).unwrap();
        let mut source = ToneSource::new(format, 440.0, 1.0, 16).with_limit(2);
        let mut packet = AudioPacket::with_frames(format, 16);

        assert_eq!(source.fill(&mut packet).unwrap(), StepOutcome::Processed);
        assert_eq!(source.fill(&mut packet).unwrap(), StepOutcome::Processed);
        assert_eq!(source.fill(&mut packet).unwrap(), StepOutcome::Finished);
        assert_eq!(source.produced(), 2);
    }
}
