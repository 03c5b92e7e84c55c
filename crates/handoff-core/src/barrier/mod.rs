//! Lock-free packet handoff between one producer and one or more consumers
//!
//! A barrier is a fixed ring of slots. The producer (usually a device
//! callback) moves [`AudioPacket`](crate::packet::AudioPacket)s in with
//! [`BarrierProducer::try_push`], consumers take them out without copying.
//! After construction every operation is a handful of atomic loads, stores
//! and compare-exchanges: no locks, no allocation, no waiting.
//!
//! # Delivery modes
//!
//! - **Claim** ([`PacketBarrier::claim`]): each packet is moved out by
//!   exactly one [`BarrierConsumer`]. Use it to spread work over a pool of
//!   workers, or with a single consumer for a plain SPSC handoff.
//! - **Broadcast** ([`PacketBarrier::broadcast`]): each
//!   [`BroadcastCursor`] reads every packet once, in production order,
//!   through a [`PacketRef`] guard. A slot is reused once every cursor has
//!   released it.
//!
//! # Overrun and underrun
//!
//! Both are expected in steady state and come back as values, never as
//! panics or waits:
//!
//! - A full ring makes `try_push` apply the configured [`OverrunPolicy`]:
//!   hand the packet back ([`PushError::Full`]) or replace the oldest unread
//!   packet ([`PushStatus::Overwrote`]).
//! - An empty ring makes `try_pop`/`try_read` return [`PopError::Empty`].
//!
//! Both are counted in [`StatsSnapshot`].
//!
//! # Shutdown
//!
//! `close()` (or dropping the producer) rejects further pushes with
//! [`PushError::Closed`]. Consumers keep draining and see
//! [`PopError::Closed`] once nothing is left. Dropping the last claim
//! consumer, or any broadcast cursor, closes the barrier for the producer.
//!
//! # Buffer recycling
//!
//! Each barrier carries a bounded lock-free pool (`2 × slot_count`).
//! Consumers hand spent packets back with `recycle`, the producer takes them
//! with [`BarrierProducer::acquire`], so steady-state operation allocates
//! nothing.
//!
//! # Example
//!
//! ```
//! use handoff_core::barrier::{BarrierConfig, PacketBarrier};
//! use handoff_core::packet::AudioPacket;
//!
//! let (mut producer, consumers) = PacketBarrier::claim(BarrierConfig::new(4)).unwrap();
//!
//! let mut packet = AudioPacket::with_capacity(4);
//! packet.assign(&[1, 2, 3, 4], 0).unwrap();
//! producer.try_push(packet).unwrap();
//!
//! let received = consumers[0].try_pop().unwrap();
//! assert_eq!(received.as_bytes(), &[1, 2, 3, 4]);
//! ```

mod config;
mod error;
mod rendezvous;
mod ring;
mod slot;
mod stats;

use std::sync::Arc;

pub use config::{BarrierConfig, OverrunPolicy, DEFAULT_SLOT_COUNT, MIN_SLOT_COUNT};
pub use error::{BarrierError, BarrierResult, PopError, PushError, PushStatus};
pub use rendezvous::{CyclicSpinBarrier, SpinBarrier};
pub use ring::{BarrierCloser, BarrierConsumer, BarrierProducer, BroadcastCursor, PacketRef};
pub use stats::{BarrierStats, StatsSnapshot};

use slot::{Delivery, Shared};

/// Barrier constructors
pub struct PacketBarrier;

impl PacketBarrier {
    /// Barrier where each packet goes to exactly one consumer
    pub fn claim(
        config: BarrierConfig,
    ) -> BarrierResult<(BarrierProducer, Vec<BarrierConsumer>)> {
        config.validate()?;
        let shared = Arc::new(Shared::new(&config, Delivery::Claim));
        let consumers = (0..config.consumer_count)
            .map(|_| BarrierConsumer::new(Arc::clone(&shared)))
            .collect();
        Ok((BarrierProducer::new(shared), consumers))
    }

    /// Barrier where every cursor observes every packet
    pub fn broadcast(
        config: BarrierConfig,
    ) -> BarrierResult<(BarrierProducer, Vec<BroadcastCursor>)> {
        config.validate()?;
        let readers = config.consumer_count;
        let shared = Arc::new(Shared::new(&config, Delivery::Broadcast { readers }));
        let cursors = (0..readers)
            .map(|id| BroadcastCursor::new(Arc::clone(&shared), id))
            .collect();
        Ok((BarrierProducer::new(shared), cursors))
    }

    /// Single-producer single-consumer barrier
    pub fn spsc(
        slot_count: usize,
        policy: OverrunPolicy,
    ) -> BarrierResult<(BarrierProducer, BarrierConsumer)> {
        let config = BarrierConfig::new(slot_count).with_policy(policy);
        let (producer, mut consumers) = Self::claim(config)?;
        match consumers.pop() {
            Some(consumer) => Ok((producer, consumer)),
            None => Err(BarrierError::NoConsumers),
        }
    }
}
