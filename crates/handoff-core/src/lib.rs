//! Handoff Core - lock-free packet handoff between real-time audio stages
//!
//! Captured audio is cut into [`packet::AudioPacket`]s and passed through
//! [`barrier`]s from the capture callback, through filter workers, to the
//! playback callback. Barriers recycle packets through a pool, so the
//! steady state neither locks nor allocates.

pub mod audio;
pub mod barrier;
pub mod config;
pub mod filter;
pub mod packet;
pub mod task;
