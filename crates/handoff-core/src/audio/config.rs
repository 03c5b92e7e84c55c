//! Device selection and buffer settings

use serde::{Deserialize, Serialize};

/// Largest device buffer accepted (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Smallest device buffer requested (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Buffer size when no preference is given (frames)
///
/// 512 frames at 48kHz is about 10.7ms, safe on most systems.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Buffer size used by [`BufferSize::LowLatency`] (frames)
pub const LOW_LATENCY_BUFFER_SIZE: u32 = 256;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred device buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferSize {
    /// Let the driver choose
    #[default]
    Default,
    /// Request a specific size in frames (clamped to supported bounds)
    Fixed(u32),
    /// Small known-good size
    LowLatency,
}

impl BufferSize {
    /// Frames to request, or None for the driver default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some((*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32)),
            BufferSize::LowLatency => Some(LOW_LATENCY_BUFFER_SIZE),
        }
    }

    /// Frames used for sizing buffers when the driver picks
    pub fn frames_or_default(&self) -> u32 {
        self.as_frames().unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// One-way latency at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Carries the host backend (JACK, ALSA, ...) next to the device name, since
/// the same name can appear under several hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Host backend; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Label including the host if known, e.g. "[ALSA] hw:0,0"
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.as_frames(), None);
        assert_eq!(BufferSize::Default.frames_or_default(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).as_frames(), Some(MIN_BUFFER_SIZE));
        assert_eq!(BufferSize::Fixed(100_000).as_frames(), Some(MAX_BUFFER_SIZE as u32));
        assert_eq!(BufferSize::LowLatency.as_frames(), Some(256));
        let latency = BufferSize::Fixed(480).latency_ms(48000).unwrap();
        assert!((latency - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_device_id_label() {
        assert_eq!(DeviceId::new("default").display_label(), "default");
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").to_string(), "[ALSA] hw:0,0");
    }

    #[test]
    fn test_device_id_yaml() {
        let id: DeviceId = serde_yaml::from_str("name: pulse").unwrap();
        assert_eq!(id, DeviceId::new("pulse"));
        let size: BufferSize = serde_yaml::from_str("!fixed 128").unwrap();
        assert_eq!(size, BufferSize::Fixed(128));
    }
}
