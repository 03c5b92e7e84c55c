//! Audio device enumeration and management
//!
//! Devices are enumerated from ALL available audio hosts (JACK, ALSA,
//! PulseAudio, WASAPI, ...). The same physical device may show up once per
//! host, so every [`DeviceId`] carries its host name.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId, SupportedStreamConfigRange};

use super::backend::DeviceKind;
use super::config::DeviceId;
use super::cpal_backend::{CpalCaptureDevice, CpalPlaybackDevice};
use super::error::{AudioError, AudioResult};

/// Sample rates probed against each device's supported ranges
const COMMON_SAMPLE_RATES: [u32; 8] = [8000, 16000, 44100, 48000, 88200, 96000, 176400, 192000];

/// Human-readable name for a host ID
pub(super) fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn host_devices(host: &Host, kind: DeviceKind) -> Result<Vec<cpal::Device>, cpal::DevicesError> {
    Ok(match kind {
        DeviceKind::Capture => host.input_devices()?.collect(),
        DeviceKind::Playback => host.output_devices()?.collect(),
    })
}

fn host_default(host: &Host, kind: DeviceKind) -> Option<cpal::Device> {
    match kind {
        DeviceKind::Capture => host.default_input_device(),
        DeviceKind::Playback => host.default_output_device(),
    }
}

/// Stream configurations a device supports in direction `kind`
pub(super) fn supported_configs(
    device: &cpal::Device,
    kind: DeviceKind,
) -> AudioResult<Vec<SupportedStreamConfigRange>> {
    let configs = match kind {
        DeviceKind::Capture => device.supported_input_configs().map(|c| c.collect()),
        DeviceKind::Playback => device.supported_output_configs().map(|c| c.collect()),
    };
    configs.map_err(|e| AudioError::ConfigError(e.to_string()))
}

/// Information about one device in one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Identifier for configuration (includes host)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g. "ALSA", "JACK")
    pub host: String,
    pub kind: DeviceKind,
    /// Default device of its host for this direction
    pub is_default: bool,
    /// Common sample rates inside the supported ranges
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// Every device of direction `kind` across all hosts
///
/// Sorted with defaults first, then by host and name.
pub fn enumerate_devices(kind: DeviceKind) -> AudioResult<Vec<DeviceInfo>> {
    let mut all_devices: Vec<DeviceInfo> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host_default(&host, kind).and_then(|d| d.name().ok());

        let devices = match host_devices(&host, kind) {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate {} devices for {:?}: {}", kind, host_id, e);
                continue;
            }
        };

        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            let configs = match supported_configs(&device, kind) {
                Ok(c) if !c.is_empty() => c,
                _ => continue,
            };

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;
            for config in &configs {
                max_channels = max_channels.max(config.channels());
                for rate in COMMON_SAMPLE_RATES {
                    if rate >= config.min_sample_rate().0
                        && rate <= config.max_sample_rate().0
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort_unstable();

            all_devices.push(DeviceInfo {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                kind,
                sample_rates,
                max_channels,
            });
        }
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(all_devices)
}

/// Find a device by its ID
///
/// Uses the host named in the ID if there is one, otherwise searches every
/// host.
pub fn find_device_by_id(id: &DeviceId, kind: DeviceKind) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(host_by_name) {
        return host_devices(&host, kind)
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .into_iter()
            .find(matches)
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host_devices(&host, kind).ok())
        .flatten()
        .find(matches)
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// Default device of the default host, with its ID
pub fn default_device(kind: DeviceKind) -> AudioResult<(cpal::Device, DeviceId)> {
    let host = cpal::default_host();
    let device = host_default(&host, kind)
        .ok_or_else(|| AudioError::NoDefaultDevice(format!("No default {} device", kind)))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let id = DeviceId::with_host(&name, &host_name(host.id()));
    Ok((device, id))
}

/// Entry point for discovering and opening devices
///
/// [`initialize`](Self::initialize) takes a snapshot of every capture and
/// playback device; opening a device looks it up live, so a device plugged
/// in after the snapshot can still be opened by ID.
#[derive(Debug, Default)]
pub struct AudioDeviceManager {
    initialized: bool,
    capture: Vec<DeviceInfo>,
    playback: Vec<DeviceInfo>,
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate devices from all hosts
    pub fn initialize(&mut self) -> AudioResult<()> {
        self.capture = enumerate_devices(DeviceKind::Capture)?;
        self.playback = enumerate_devices(DeviceKind::Playback)?;
        self.initialized = true;

        if self.capture.is_empty() && self.playback.is_empty() {
            return Err(AudioError::NoDevices);
        }
        log::info!(
            "Enumerated {} capture and {} playback devices from {} hosts",
            self.capture.len(),
            self.playback.len(),
            cpal::available_hosts().len()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn capture_devices(&self) -> &[DeviceInfo] {
        &self.capture
    }

    pub fn playback_devices(&self) -> &[DeviceInfo] {
        &self.playback
    }

    /// Capture devices followed by playback devices
    pub fn all_devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.capture.iter().chain(self.playback.iter())
    }

    /// Open a capture device by ID, or the default one
    pub fn open_capture(&self, id: Option<&DeviceId>) -> AudioResult<CpalCaptureDevice> {
        match id {
            Some(id) => {
                let device = find_device_by_id(id, DeviceKind::Capture)?;
                Ok(CpalCaptureDevice::new(device, id.clone()))
            }
            None => self.default_capture_device(),
        }
    }

    /// Open a playback device by ID, or the default one
    pub fn open_playback(&self, id: Option<&DeviceId>) -> AudioResult<CpalPlaybackDevice> {
        match id {
            Some(id) => {
                let device = find_device_by_id(id, DeviceKind::Playback)?;
                Ok(CpalPlaybackDevice::new(device, id.clone()))
            }
            None => self.default_playback_device(),
        }
    }

    pub fn default_capture_device(&self) -> AudioResult<CpalCaptureDevice> {
        let (device, id) = default_device(DeviceKind::Capture)?;
        Ok(CpalCaptureDevice::new(device, id))
    }

    pub fn default_playback_device(&self) -> AudioResult<CpalPlaybackDevice> {
        let (device, id) = default_device(DeviceKind::Playback)?;
        Ok(CpalPlaybackDevice::new(device, id))
    }

    /// Record what the default playback device is playing
    ///
    /// Only hosts with loopback capture (WASAPI) accept the resulting stream;
    /// elsewhere [`AudioDevice::start`](super::AudioDevice::start) fails with
    /// a stream build error.
    pub fn default_playback_as_capture(&self) -> AudioResult<CpalCaptureDevice> {
        let (device, id) = default_device(DeviceKind::Playback)?;
        Ok(CpalCaptureDevice::loopback(device, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_names() {
        for host_id in cpal::available_hosts() {
            let name = host_name(host_id);
            assert!(!name.is_empty());
            assert_ne!(name, "Alsa");
        }
    }

    #[test]
    fn test_device_enumeration() {
        // may find nothing on CI machines
        let mut manager = AudioDeviceManager::new();
        match manager.initialize() {
            Ok(()) => {
                assert!(manager.is_initialized());
                for device in manager.all_devices() {
                    println!(
                        "  - {} {} (default: {}, channels: {}, rates: {:?})",
                        device.kind, device, device.is_default, device.max_channels, device.sample_rates
                    );
                    assert!(device.max_channels > 0);
                }
                let defaults = manager
                    .playback_devices()
                    .iter()
                    .take_while(|d| d.is_default)
                    .count();
                assert!(manager
                    .playback_devices()
                    .iter()
                    .skip(defaults)
                    .all(|d| !d.is_default));
            }
            Err(AudioError::NoDevices) => {
                println!("No audio devices available (expected in CI)");
            }
            Err(e) => {
                println!("Error enumerating devices: {}", e);
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::new("handoff-no-such-device");
        assert!(matches!(
            find_device_by_id(&id, DeviceKind::Playback),
            Err(AudioError::DeviceNotFound(_))
        ));
    }
}
