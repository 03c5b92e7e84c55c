//! Audio devices and the real-time ends of a pipeline
//!
//! # Architecture
//!
//! ```text
//!  driver thread                workers                       driver thread
//!  ─────────────                ───────                       ─────────────
//!  CpalCaptureDevice                                          CpalPlaybackDevice
//!    └─ CaptureEndpoint ─▶ barrier ─▶ filters ─▶ barrier ─▶ PlaybackEndpoint ─┘
//!           │                                                      │
//!           └──────────── RtEvent rings ─▶ EventDrain (log) ◀──────┘
//! ```
//!
//! The endpoints are the only code that runs on driver threads. They never
//! block, allocate or log: packets come from the barrier's pool and
//! problems are reported as [`RtEvent`]s.
//!
//! Devices are enumerated across every CPAL host (ALSA, JACK, PulseAudio,
//! WASAPI, CoreAudio). JACK support is opt-in through the `jack` feature.

mod backend;
mod config;
mod cpal_backend;
mod device;
mod endpoint;
mod error;
mod events;

pub use backend::{AudioDevice, DeviceKind, StreamRequest};
pub use config::{
    BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, LOW_LATENCY_BUFFER_SIZE,
    MAX_BUFFER_SIZE, MIN_BUFFER_SIZE,
};
pub use cpal_backend::{sample_encoding, CpalCaptureDevice, CpalPlaybackDevice};
pub use device::{default_device, enumerate_devices, find_device_by_id, AudioDeviceManager, DeviceInfo};
pub use endpoint::{CaptureEndpoint, PlaybackEndpoint};
pub use error::{AudioError, AudioResult};
pub use events::{
    rt_event_channel, EventDrain, EventTally, RtEvent, RtEventReceiver, RtEventSender,
    DEFAULT_DRAIN_INTERVAL, EVENT_QUEUE_CAPACITY,
};
