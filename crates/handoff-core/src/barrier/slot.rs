//! Slot ring shared by every handle of one barrier
//!
//! # Slot state machine
//!
//! ```text
//!            producer            producer
//!   EMPTY ─────────────▶ WRITING ─────────▶ READY
//!     ▲                                      │
//!     │    claim consumer / last cursor      │ claim consumer
//!     └──────────────────── READING ◀────────┘
//! ```
//!
//! `seq` holds the production index of the packet currently in the slot.
//! It is stored after the packet and before the `READY` release. A claim
//! reader re-checks `seq == n` while holding `READING`; a broadcast reader
//! loads `seq`, then `state`, then `seq` again under its pin, and only a
//! matching pair around `READY` means the slot holds packet `n` in full.
//!
//! Broadcast slots never enter `READING`. Readers pin a slot through
//! `active` and count down `pending`; the reader that brings `pending` to
//! zero returns the slot to `EMPTY`. Overwriting a `READY` slot in
//! broadcast mode only goes ahead if no reader is pinned, checked with a
//! sequentially consistent handshake on `state` and `active`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;

use super::config::{BarrierConfig, OverrunPolicy};
use super::stats::BarrierStats;
use crate::packet::AudioPacket;

pub(super) const EMPTY: u8 = 0;
pub(super) const WRITING: u8 = 1;
pub(super) const READY: u8 = 2;
pub(super) const READING: u8 = 3;

/// Producer gate: closed flag
const GATE_CLOSED: u8 = 0b01;
/// Producer gate: a push is between its closed check and its publication
const GATE_BUSY: u8 = 0b10;

pub(super) struct Slot {
    pub(super) state: AtomicU8,
    pub(super) seq: AtomicU64,
    /// Broadcast readers that still have to read the current packet
    pub(super) pending: AtomicUsize,
    /// Broadcast readers currently pinning the slot
    pub(super) active: AtomicUsize,
    packet: UnsafeCell<AudioPacket>,
}

// SAFETY: `packet` is only written by the thread that moved the slot into
// WRITING or READING, and only read through a pin on a READY slot; the state
// transitions use acquire/release ordering.
unsafe impl Sync for Slot {}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            seq: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            packet: UnsafeCell::new(AudioPacket::empty()),
        }
    }

    /// Swap in a new packet, returning the previous occupant
    ///
    /// # Safety
    /// Caller must hold the slot in `WRITING`.
    #[inline]
    pub(super) unsafe fn replace(&self, packet: AudioPacket) -> AudioPacket {
        std::mem::replace(&mut *self.packet.get(), packet)
    }

    /// Move the packet out, leaving an empty placeholder
    ///
    /// # Safety
    /// Caller must hold the slot in `READING`.
    #[inline]
    pub(super) unsafe fn take(&self) -> AudioPacket {
        (*self.packet.get()).take()
    }

    /// # Safety
    /// Caller must hold a broadcast pin on a `READY` slot.
    #[inline]
    pub(super) unsafe fn get(&self) -> &AudioPacket {
        &*self.packet.get()
    }
}

/// How packets are delivered to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Delivery {
    /// Each packet goes to exactly one consumer
    Claim,
    /// Each packet is read by every cursor
    Broadcast { readers: usize },
}

pub(super) struct Shared {
    slots: Box<[CachePadded<Slot>]>,
    pub(super) delivery: Delivery,
    pub(super) policy: OverrunPolicy,
    /// Next ticket to claim (claim delivery only)
    pub(super) tail: CachePadded<AtomicU64>,
    /// Packets published so far
    pub(super) published: CachePadded<AtomicU64>,
    gate: AtomicU8,
    /// Slots holding a packet not yet fully consumed
    pub(super) occupied: AtomicUsize,
    pub(super) live_consumers: AtomicUsize,
    producer_alive: AtomicBool,
    pub(super) stats: BarrierStats,
    pub(super) pool: ArrayQueue<AudioPacket>,
}

impl Shared {
    pub(super) fn new(config: &BarrierConfig, delivery: Delivery) -> Self {
        Self {
            slots: (0..config.slot_count)
                .map(|_| CachePadded::new(Slot::new()))
                .collect(),
            delivery,
            policy: config.overrun_policy,
            tail: CachePadded::new(AtomicU64::new(0)),
            published: CachePadded::new(AtomicU64::new(0)),
            gate: AtomicU8::new(0),
            occupied: AtomicUsize::new(0),
            live_consumers: AtomicUsize::new(config.consumer_count),
            producer_alive: AtomicBool::new(true),
            stats: BarrierStats::default(),
            pool: ArrayQueue::new(config.pool_capacity()),
        }
    }

    #[inline]
    pub(super) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(super) fn slot(&self, seq: u64) -> &Slot {
        &self.slots[(seq % self.slots.len() as u64) as usize]
    }

    /// Mark a push in flight; false if the barrier is closed
    #[inline]
    pub(super) fn enter_push(&self) -> bool {
        let gate = self.gate.fetch_or(GATE_BUSY, Ordering::AcqRel);
        if gate & GATE_CLOSED != 0 {
            self.gate.fetch_and(!GATE_BUSY, Ordering::Release);
            return false;
        }
        true
    }

    #[inline]
    pub(super) fn leave_push(&self) {
        self.gate.fetch_and(!GATE_BUSY, Ordering::Release);
    }

    pub(super) fn close(&self) {
        self.gate.fetch_or(GATE_CLOSED, Ordering::AcqRel);
    }

    pub(super) fn is_closed(&self) -> bool {
        self.gate.load(Ordering::Acquire) & GATE_CLOSED != 0
    }

    /// True once closed, no push is in flight, and `position` has caught up
    /// with everything published
    pub(super) fn is_drained(&self, position: u64) -> bool {
        let gate = self.gate.load(Ordering::Acquire);
        gate & GATE_CLOSED != 0
            && gate & GATE_BUSY == 0
            && position >= self.published.load(Ordering::Acquire)
    }

    pub(super) fn len(&self) -> usize {
        self.occupied.load(Ordering::Acquire).min(self.slots.len())
    }

    pub(super) fn producer_dropped(&self) {
        self.producer_alive.store(false, Ordering::Release);
        self.close();
    }

    pub(super) fn has_producer(&self) -> bool {
        self.producer_alive.load(Ordering::Acquire)
    }

    /// A consumer handle went away; closes the barrier when required
    pub(super) fn consumer_dropped(&self) {
        let remaining = self.live_consumers.fetch_sub(1, Ordering::AcqRel) - 1;
        // a missing broadcast reader would pin every slot forever
        if remaining == 0 || matches!(self.delivery, Delivery::Broadcast { .. }) {
            self.close();
        }
    }

    /// Hand a spent packet to the pool; false if the pool is full
    pub(super) fn recycle(&self, mut packet: AudioPacket) -> bool {
        if packet.capacity() == 0 {
            return false;
        }
        packet.clear();
        self.pool.push(packet).is_ok()
    }
}
