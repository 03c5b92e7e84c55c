//! Configuration of one capture → filters → playback engine
//!
//! ```yaml
//! format: { channels: 2, sample_rate: 48000, bits_per_sample: 32, encoding: pcm-float }
//! packet_frames: 480
//! prefill_packets: 8
//! barrier: { slot_count: 4, overrun_policy: drop-incoming }
//! filters:
//!   - name: gain
//!     params: { gain: 0.8 }
//! capture_device: { name: "USB Audio", host: ALSA }
//! buffer_size: low-latency
//! ```

use serde::{Deserialize, Serialize};

use crate::audio::{BufferSize, DeviceId, StreamRequest};
use crate::barrier::BarrierConfig;
use crate::filter::native::{ChannelMap, NearestResampler};
use crate::filter::{Filter, FilterRegistry, FilterResult, FilterSpec};
use crate::packet::{AudioFormat, PacketError};
use crate::task::{DEFAULT_PACKET_FRAMES, DEFAULT_PREFILL_PACKETS};

/// File name used when no config path is given
pub const DEFAULT_CONFIG_FILE: &str = "loopback.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested capture format; None lets the device choose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,
    /// Frames per packet handed between stages
    pub packet_frames: usize,
    /// Packets preallocated in every barrier pool
    pub prefill_packets: usize,
    pub barrier: BarrierConfig,
    /// User filters, applied in order before any format conversion
    pub filters: Vec<FilterSpec>,
    /// None opens the default device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_device: Option<DeviceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_device: Option<DeviceId>,
    pub buffer_size: BufferSize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            format: None,
            packet_frames: DEFAULT_PACKET_FRAMES,
            prefill_packets: DEFAULT_PREFILL_PACKETS,
            barrier: BarrierConfig::default(),
            filters: Vec::new(),
            capture_device: None,
            playback_device: None,
            buffer_size: BufferSize::default(),
        }
    }
}

impl EngineConfig {
    /// Stream request for the capture device
    pub fn capture_request(&self) -> StreamRequest {
        match &self.format {
            Some(format) => StreamRequest::for_format(format, self.buffer_size),
            None => StreamRequest {
                buffer_size: self.buffer_size,
                ..StreamRequest::default()
            },
        }
    }

    /// Stream request for the playback device, matching what capture delivered
    pub fn playback_request(&self, captured: &AudioFormat) -> StreamRequest {
        StreamRequest::for_format(captured, self.buffer_size)
    }

    /// Instantiate the configured filters for a `capture` → `playback` run
    ///
    /// Channel mapping and resampling are appended when the user filters
    /// leave a format the playback device does not accept. Sample encoding
    /// and width are never converted; a mismatch there is an error.
    pub fn build_filters(
        &self,
        registry: &FilterRegistry,
        capture: &AudioFormat,
        playback: &AudioFormat,
    ) -> FilterResult<Vec<Box<dyn Filter>>> {
        let mut filters = Vec::with_capacity(self.filters.len() + 2);
        let mut format = *capture;
        for spec in &self.filters {
            let filter = registry.create(spec)?;
            format = filter.output_format(&format)?;
            filters.push(filter);
        }

        if format.encoding() != playback.encoding()
            || format.bits_per_sample() != playback.bits_per_sample()
        {
            return Err(PacketError::FormatMismatch {
                expected: *playback,
                actual: format,
            }
            .into());
        }
        if format.channels() != playback.channels() {
            log::info!(
                "Mapping {} channels to {}",
                format.channels(),
                playback.channels()
            );
            filters.push(Box::new(ChannelMap::new(playback.channels())?));
        }
        if format.sample_rate() != playback.sample_rate() {
            log::info!(
                "Resampling {}Hz to {}Hz",
                format.sample_rate(),
                playback.sample_rate()
            );
            filters.push(Box::new(NearestResampler::new(playback.sample_rate())?));
        }
        Ok(filters)
    }
}
