//! Audio data model: formats, owned packets and borrowed sample views

mod audio_packet;
mod error;
mod format;
mod sample;

pub use audio_packet::{determine_buffer_size, AudioPacket, DEFAULT_PACKET_CAPACITY};
pub use error::{PacketError, PacketResult};
pub use format::{AudioFormat, FormatError, SampleEncoding, SUPPORTED_BIT_DEPTHS};
pub use sample::{AudioSample, AudioSampleMut, Frame};
