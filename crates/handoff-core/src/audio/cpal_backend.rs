//! CPAL capture and playback devices
//!
//! Streams run in the device's native sample type. The callback reinterprets
//! the typed buffer as bytes (`bytemuck`) and hands it to the attached
//! endpoint, so no conversion happens on the real-time thread: the pipeline
//! format is chosen to match what the driver delivers.

use bytemuck::Pod;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfigRange,
};

use super::backend::{AudioDevice, DeviceKind, StreamRequest};
use super::config::{BufferSize, DeviceId, DEFAULT_SAMPLE_RATE};
use super::device::supported_configs;
use super::endpoint::{CaptureEndpoint, PlaybackEndpoint};
use super::error::{AudioError, AudioResult};
use crate::packet::{AudioFormat, SampleEncoding};

/// Channels requested when the caller has no preference
const DEFAULT_CHANNELS: u16 = 2;

/// Sample width and encoding for a CPAL sample format
///
/// Formats without a matching [`AudioFormat`] (signed 8-bit, unsigned
/// 16-bit and wider) are not used.
pub fn sample_encoding(format: SampleFormat) -> Option<(u16, SampleEncoding)> {
    match format {
        SampleFormat::U8 => Some((8, SampleEncoding::PcmInt)),
        SampleFormat::I16 => Some((16, SampleEncoding::PcmInt)),
        SampleFormat::I32 => Some((32, SampleEncoding::PcmInt)),
        SampleFormat::I64 => Some((64, SampleEncoding::PcmInt)),
        SampleFormat::F32 => Some((32, SampleEncoding::PcmFloat)),
        SampleFormat::F64 => Some((64, SampleEncoding::PcmFloat)),
        _ => None,
    }
}

/// Stream parameters agreed with the driver
#[derive(Debug, Clone)]
struct Negotiated {
    config: StreamConfig,
    sample_format: SampleFormat,
    format: AudioFormat,
}

/// Pick the best supported configuration for `request`
///
/// Preference order: f32 with the requested channel count and rate, any
/// usable format with the requested channels and rate, any usable format
/// with the rate, then the first usable format. A rate outside the chosen
/// range falls back to the range's maximum.
fn select_config(
    configs: &[SupportedStreamConfigRange],
    request: &StreamRequest,
) -> AudioResult<Negotiated> {
    let usable: Vec<&SupportedStreamConfigRange> = configs
        .iter()
        .filter(|c| sample_encoding(c.sample_format()).is_some())
        .collect();
    if usable.is_empty() {
        return Err(AudioError::UnsupportedFormat(match configs.first() {
            Some(c) => format!("{:?}", c.sample_format()),
            None => "no supported configurations".to_string(),
        }));
    }

    let target_rate = request.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let target_channels = request.channels.unwrap_or(DEFAULT_CHANNELS);
    let rate_ok = |c: &SupportedStreamConfigRange| {
        target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0
    };

    let best = usable
        .iter()
        .copied()
        .find(|c| {
            c.sample_format() == SampleFormat::F32 && c.channels() == target_channels && rate_ok(*c)
        })
        .or_else(|| {
            usable
                .iter()
                .copied()
                .find(|c| c.channels() == target_channels && rate_ok(*c))
        })
        .or_else(|| usable.iter().copied().find(|c| rate_ok(*c)))
        .or_else(|| usable.first().copied())
        .ok_or_else(|| AudioError::ConfigError("No suitable configuration found".to_string()))?;

    let sample_rate = if rate_ok(best) {
        target_rate
    } else {
        let fallback = best.max_sample_rate().0;
        log::warn!(
            "Device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback
        );
        fallback
    };

    let sample_format = best.sample_format();
    let (bits, encoding) = sample_encoding(sample_format)
        .ok_or_else(|| AudioError::UnsupportedFormat(format!("{:?}", sample_format)))?;
    let format = AudioFormat::new(best.channels(), sample_rate, bits, encoding)?;

    let config = StreamConfig {
        channels: best.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: buffer_size_to_cpal(request.buffer_size),
    };

    Ok(Negotiated {
        config,
        sample_format,
        format,
    })
}

fn buffer_size_to_cpal(buffer_size: BufferSize) -> CpalBufferSize {
    match buffer_size.as_frames() {
        Some(frames) => CpalBufferSize::Fixed(frames),
        None => CpalBufferSize::Default,
    }
}

fn log_negotiated(kind: DeviceKind, id: &DeviceId, negotiated: &Negotiated) {
    log::info!(
        "Audio {} config for {}: {} ({:?}), buffer {:?}",
        kind,
        id,
        negotiated.format,
        negotiated.sample_format,
        negotiated.config.buffer_size
    );
}

fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut endpoint: CaptureEndpoint,
) -> AudioResult<Stream>
where
    T: SizedSample + Pod,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                endpoint.on_capture_ready(bytemuck::cast_slice(data));
            },
            move |err| {
                log::error!("Capture stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

fn build_playback_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut endpoint: PlaybackEndpoint,
) -> AudioResult<Stream>
where
    T: SizedSample + Pod,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                endpoint.on_playback_needed(bytemuck::cast_slice_mut(data));
            },
            move |err| {
                log::error!("Playback stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Pause and drop a running stream
fn close_stream(stream: Stream, id: &DeviceId) {
    if let Err(e) = stream.pause() {
        log::debug!("Could not pause stream of {}: {}", id, e);
    }
    drop(stream);
    log::info!("Audio stream of {} stopped", id);
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture
// ─────────────────────────────────────────────────────────────────────────────

/// Input stream feeding a [`CaptureEndpoint`]
///
/// The endpoint moves into the stream on [`start`](AudioDevice::start);
/// stopping drops it, which closes the pipeline's first barrier.
pub struct CpalCaptureDevice {
    id: DeviceId,
    device: cpal::Device,
    /// Capture what an output device plays (WASAPI loopback)
    loopback: bool,
    negotiated: Option<Negotiated>,
    endpoint: Option<CaptureEndpoint>,
    stream: Option<Stream>,
}

impl CpalCaptureDevice {
    pub fn new(device: cpal::Device, id: DeviceId) -> Self {
        Self {
            id,
            device,
            loopback: false,
            negotiated: None,
            endpoint: None,
            stream: None,
        }
    }

    /// Capture from an output device
    pub fn loopback(device: cpal::Device, id: DeviceId) -> Self {
        Self {
            loopback: true,
            ..Self::new(device, id)
        }
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// Attach the endpoint the stream will feed
    ///
    /// Fails if the endpoint's format is not the negotiated one.
    pub fn attach(&mut self, endpoint: CaptureEndpoint) -> AudioResult<()> {
        let negotiated = self
            .negotiated
            .as_ref()
            .ok_or_else(|| AudioError::NotInitialized(self.id.display_label()))?;
        if endpoint.format() != negotiated.format {
            return Err(AudioError::UnsupportedFormat(format!(
                "endpoint expects {}, device delivers {}",
                endpoint.format(),
                negotiated.format
            )));
        }
        self.endpoint = Some(endpoint);
        Ok(())
    }
}

impl AudioDevice for CpalCaptureDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Capture
    }

    fn format(&self) -> Option<AudioFormat> {
        self.negotiated.as_ref().map(|n| n.format)
    }

    fn is_valid(&self) -> bool {
        self.negotiated.is_some()
    }

    fn initialize(&mut self, request: &StreamRequest) -> AudioResult<AudioFormat> {
        // loopback capture takes the output side's configurations
        let direction = if self.loopback {
            DeviceKind::Playback
        } else {
            DeviceKind::Capture
        };
        let negotiated = select_config(&supported_configs(&self.device, direction)?, request)?;
        log_negotiated(DeviceKind::Capture, &self.id, &negotiated);
        let format = negotiated.format;
        self.negotiated = Some(negotiated);
        Ok(format)
    }

    fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let negotiated = self
            .negotiated
            .as_ref()
            .ok_or_else(|| AudioError::NotInitialized(self.id.display_label()))?;
        let endpoint = self
            .endpoint
            .take()
            .ok_or_else(|| AudioError::NotInitialized(self.id.display_label()))?;

        let config = &negotiated.config;
        let stream = match negotiated.sample_format {
            SampleFormat::U8 => build_capture_stream::<u8>(&self.device, config, endpoint),
            SampleFormat::I16 => build_capture_stream::<i16>(&self.device, config, endpoint),
            SampleFormat::I32 => build_capture_stream::<i32>(&self.device, config, endpoint),
            SampleFormat::I64 => build_capture_stream::<i64>(&self.device, config, endpoint),
            SampleFormat::F32 => build_capture_stream::<f32>(&self.device, config, endpoint),
            SampleFormat::F64 => build_capture_stream::<f64>(&self.device, config, endpoint),
            other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!("Capture stream started on {}", self.id);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        if let Some(stream) = self.stream.take() {
            close_stream(stream, &self.id);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Output stream drained from a [`PlaybackEndpoint`]
pub struct CpalPlaybackDevice {
    id: DeviceId,
    device: cpal::Device,
    negotiated: Option<Negotiated>,
    endpoint: Option<PlaybackEndpoint>,
    stream: Option<Stream>,
}

impl CpalPlaybackDevice {
    pub fn new(device: cpal::Device, id: DeviceId) -> Self {
        Self {
            id,
            device,
            negotiated: None,
            endpoint: None,
            stream: None,
        }
    }

    /// Attach the endpoint the stream will drain
    pub fn attach(&mut self, endpoint: PlaybackEndpoint) -> AudioResult<()> {
        let negotiated = self
            .negotiated
            .as_ref()
            .ok_or_else(|| AudioError::NotInitialized(self.id.display_label()))?;
        if endpoint.format() != negotiated.format {
            return Err(AudioError::UnsupportedFormat(format!(
                "endpoint delivers {}, device expects {}",
                endpoint.format(),
                negotiated.format
            )));
        }
        self.endpoint = Some(endpoint);
        Ok(())
    }
}

impl AudioDevice for CpalPlaybackDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Playback
    }

    fn format(&self) -> Option<AudioFormat> {
        self.negotiated.as_ref().map(|n| n.format)
    }

    fn is_valid(&self) -> bool {
        self.negotiated.is_some()
    }

    fn initialize(&mut self, request: &StreamRequest) -> AudioResult<AudioFormat> {
        let negotiated = select_config(
            &supported_configs(&self.device, DeviceKind::Playback)?,
            request,
        )?;
        log_negotiated(DeviceKind::Playback, &self.id, &negotiated);
        let format = negotiated.format;
        self.negotiated = Some(negotiated);
        Ok(format)
    }

    fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let negotiated = self
            .negotiated
            .as_ref()
            .ok_or_else(|| AudioError::NotInitialized(self.id.display_label()))?;
        let endpoint = self
            .endpoint
            .take()
            .ok_or_else(|| AudioError::NotInitialized(self.id.display_label()))?;

        let config = &negotiated.config;
        let stream = match negotiated.sample_format {
            SampleFormat::U8 => build_playback_stream::<u8>(&self.device, config, endpoint),
            SampleFormat::I16 => build_playback_stream::<i16>(&self.device, config, endpoint),
            SampleFormat::I32 => build_playback_stream::<i32>(&self.device, config, endpoint),
            SampleFormat::I64 => build_playback_stream::<i64>(&self.device, config, endpoint),
            SampleFormat::F32 => build_playback_stream::<f32>(&self.device, config, endpoint),
            SampleFormat::F64 => build_playback_stream::<f64>(&self.device, config, endpoint),
            other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!("Playback stream started on {}", self.id);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        if let Some(stream) = self.stream.take() {
            close_stream(stream, &self.id);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_float_with_requested_layout() {
        let configs = [
            range(2, 8000, 96000, SampleFormat::I16),
            range(1, 8000, 96000, SampleFormat::F32),
            range(2, 8000, 96000, SampleFormat::F32),
        ];
        let negotiated = select_config(&configs, &StreamRequest::default()).unwrap();
        assert_eq!(negotiated.format, AudioFormat::pcm_f32(2, 48000).unwrap());
        assert_eq!(negotiated.config.buffer_size, CpalBufferSize::Default);
    }

    #[test]
    fn test_falls_back_to_max_rate() {
        let configs = [range(2, 8000, 44100, SampleFormat::I16)];
        let request = StreamRequest {
            sample_rate: Some(96000),
            channels: Some(2),
            buffer_size: BufferSize::Fixed(128),
        };
        let negotiated = select_config(&configs, &request).unwrap();
        assert_eq!(negotiated.format, AudioFormat::pcm_i16(2, 44100).unwrap());
        assert_eq!(negotiated.config.buffer_size, CpalBufferSize::Fixed(128));
    }

    #[test]
    fn test_skips_unusable_formats() {
        let configs = [
            range(2, 8000, 48000, SampleFormat::U16),
            range(1, 8000, 48000, SampleFormat::I32),
        ];
        let negotiated = select_config(&configs, &StreamRequest::default()).unwrap();
        assert_eq!(negotiated.sample_format, SampleFormat::I32);
        assert_eq!(negotiated.format.channels(), 1);

        let unusable = [range(2, 8000, 48000, SampleFormat::U16)];
        assert!(matches!(
            select_config(&unusable, &StreamRequest::default()),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }
}
