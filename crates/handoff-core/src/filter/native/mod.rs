//! Built-in filters
//!
//! Implemented directly on packet bytes and sample views, no external DSP.

mod channel_map;
mod gain;
mod passthrough;
mod resample;

pub use channel_map::ChannelMap;
pub use gain::Gain;
pub use passthrough::Passthrough;
pub use resample::NearestResampler;
