//! Barrier error and status types

use thiserror::Error;

use crate::packet::AudioPacket;

/// Invalid barrier configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// Fewer than two slots requested
    #[error("Barrier needs at least 2 slots, got {0}")]
    TooFewSlots(usize),

    /// Zero consumers requested
    #[error("Barrier needs at least one consumer")]
    NoConsumers,
}

/// Result type for barrier construction
pub type BarrierResult<T> = Result<T, BarrierError>;

/// Successful push outcome
#[derive(Debug)]
pub enum PushStatus {
    /// Packet stored in a free slot
    Pushed,
    /// Packet replaced the oldest unread one, which is returned for recycling
    Overwrote(AudioPacket),
}

/// Rejected push; the packet is handed back to the caller
#[derive(Error, Debug)]
pub enum PushError {
    /// Every slot is occupied (overrun)
    #[error("Barrier is full")]
    Full(AudioPacket),

    /// The barrier was closed
    #[error("Barrier is closed")]
    Closed(AudioPacket),
}

impl PushError {
    /// Recover the rejected packet
    pub fn into_inner(self) -> AudioPacket {
        match self {
            PushError::Full(packet) | PushError::Closed(packet) => packet,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }
}

/// Nothing to hand to a consumer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// No packet is ready yet (underrun)
    #[error("No packet ready")]
    Empty,

    /// The barrier was closed and every packet has been delivered
    #[error("Barrier is closed and drained")]
    Closed,
}
