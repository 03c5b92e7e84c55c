//! Producer, consumer and cursor handles over a shared slot ring

use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::utils::Backoff;

use super::config::OverrunPolicy;
use super::error::{PopError, PushError, PushStatus};
use super::slot::{Delivery, Shared, Slot, EMPTY, READING, READY, WRITING};
use super::stats::StatsSnapshot;
use crate::packet::{AudioFormat, AudioPacket};

/// Spins a claim consumer spends on a slot held by someone else before giving up
const CONTENDED_RETRIES: u32 = 4;

/// Map a failed read to Closed (drained) or Empty (underrun)
#[inline]
fn vacancy(shared: &Shared, position: u64) -> PopError {
    if shared.is_drained(position) {
        PopError::Closed
    } else {
        shared.stats.record_underrun();
        PopError::Empty
    }
}

/// Stamp the sequence number and release the slot to consumers
#[inline]
fn publish(shared: &Shared, slot: &Slot, head: &mut u64) {
    slot.seq.store(*head, Ordering::Release);
    if let Delivery::Broadcast { readers } = shared.delivery {
        slot.pending.store(readers, Ordering::Relaxed);
    }
    slot.state.store(READY, Ordering::SeqCst);
    *head += 1;
    shared.published.store(*head, Ordering::Release);
    shared.stats.record_push();
}

/// Replace the oldest unread packet in `slot`
fn overwrite(
    shared: &Shared,
    slot: &Slot,
    head: &mut u64,
    packet: AudioPacket,
) -> Result<PushStatus, PushError> {
    if slot
        .state
        .compare_exchange(READY, WRITING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        // oldest slot is being read or released
        return Err(PushError::Full(packet));
    }
    if matches!(shared.delivery, Delivery::Broadcast { .. })
        && slot.active.load(Ordering::SeqCst) != 0
    {
        slot.state.store(READY, Ordering::Release);
        return Err(PushError::Full(packet));
    }

    // SAFETY: slot is held in WRITING with no pinned readers
    let old = unsafe { slot.replace(packet) };
    publish(shared, slot, head);
    shared.stats.record_overwrite();
    Ok(PushStatus::Overwrote(old))
}

// ─────────────────────────────────────────────────────────────────────────────
// Producer
// ─────────────────────────────────────────────────────────────────────────────

/// Write side of a barrier
///
/// Exactly one exists per barrier. Every method is wait-free and performs no
/// allocation except [`acquire_or_allocate`](Self::acquire_or_allocate) and
/// [`prefill`](Self::prefill), which are meant for warm-up.
pub struct BarrierProducer {
    shared: Arc<Shared>,
    /// Production index of the next packet
    head: u64,
}

impl BarrierProducer {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared, head: 0 }
    }

    /// Move `packet` into the next slot without blocking
    ///
    /// On a full ring the overrun is counted and the configured
    /// [`OverrunPolicy`] decides between handing the packet back
    /// ([`PushError::Full`]) and replacing the oldest unread packet
    /// ([`PushStatus::Overwrote`]).
    pub fn try_push(&mut self, packet: AudioPacket) -> Result<PushStatus, PushError> {
        if !self.shared.enter_push() {
            return Err(PushError::Closed(packet));
        }
        let result = self.push_inner(packet);
        self.shared.leave_push();
        result
    }

    fn push_inner(&mut self, packet: AudioPacket) -> Result<PushStatus, PushError> {
        let shared = &*self.shared;
        let slot = shared.slot(self.head);

        if slot
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            // SAFETY: slot is held in WRITING
            let previous = unsafe { slot.replace(packet) };
            shared.occupied.fetch_add(1, Ordering::AcqRel);
            publish(shared, slot, &mut self.head);
            // broadcast slots keep their last packet until rewritten
            shared.recycle(previous);
            return Ok(PushStatus::Pushed);
        }

        shared.stats.record_overrun();
        match shared.policy {
            OverrunPolicy::DropIncoming => Err(PushError::Full(packet)),
            OverrunPolicy::OverwriteOldest => overwrite(shared, slot, &mut self.head, packet),
        }
    }

    /// Pop a recycled packet from the pool (never allocates)
    pub fn acquire(&self) -> Option<AudioPacket> {
        self.shared.pool.pop()
    }

    /// Pooled packet if one is large enough, otherwise a fresh allocation
    pub fn acquire_or_allocate(&self, format: AudioFormat, capacity: usize) -> AudioPacket {
        if let Some(mut packet) = self.shared.pool.pop() {
            if packet.capacity() >= capacity && packet.set_format(format).is_ok() {
                return packet;
            }
        }
        AudioPacket::with_format(format, capacity)
    }

    /// Pre-allocate up to `count` packets into the pool; returns how many fit
    pub fn prefill(&self, count: usize, format: AudioFormat, capacity: usize) -> usize {
        (0..count)
            .take_while(|_| {
                self.shared
                    .pool
                    .push(AudioPacket::with_format(format, capacity))
                    .is_ok()
            })
            .count()
    }

    /// Return a spent packet to the pool; false if the pool is full
    pub fn recycle(&self, packet: AudioPacket) -> bool {
        self.shared.recycle(packet)
    }

    /// Handle that can close the barrier from another thread
    pub fn closer(&self) -> BarrierCloser {
        BarrierCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Packets published so far
    pub fn produced(&self) -> u64 {
        self.head
    }

    /// Stop accepting pushes; consumers drain what is left
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn pool_len(&self) -> usize {
        self.shared.pool.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for BarrierProducer {
    fn drop(&mut self) {
        self.shared.producer_dropped();
    }
}

impl std::fmt::Debug for BarrierProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrierProducer")
            .field("head", &self.head)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Closes a barrier without owning either end
///
/// Holding one does not keep the producer or the consumers alive.
#[derive(Clone)]
pub struct BarrierCloser {
    shared: Arc<Shared>,
}

impl BarrierCloser {
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl std::fmt::Debug for BarrierCloser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrierCloser")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claim consumer
// ─────────────────────────────────────────────────────────────────────────────

/// Read side of a claim-delivery barrier
///
/// Consumers share one ticket counter; each packet is moved out by exactly
/// one of them. Cloning adds another consumer.
pub struct BarrierConsumer {
    shared: Arc<Shared>,
}

impl BarrierConsumer {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Claim the oldest ready packet without blocking
    pub fn try_pop(&self) -> Result<AudioPacket, PopError> {
        let shared = &*self.shared;
        let backoff = Backoff::new();
        let mut contended = 0;
        loop {
            let ticket = shared.tail.load(Ordering::Acquire);
            let slot = shared.slot(ticket);
            let seq = slot.seq.load(Ordering::Acquire);

            if seq > ticket {
                // packet was overwritten before anyone claimed it
                let _ = shared.tail.compare_exchange(
                    ticket,
                    ticket + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                continue;
            }

            let claim = if seq == ticket {
                Some(slot.state.compare_exchange(
                    READY,
                    READING,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ))
            } else {
                None
            };

            if let Some(Ok(_)) = claim {
                // holding READING: the producer cannot touch the slot
                if slot.seq.load(Ordering::Acquire) == ticket
                    && shared
                        .tail
                        .compare_exchange(ticket, ticket + 1, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    // SAFETY: slot is held in READING
                    let packet = unsafe { slot.take() };
                    slot.state.store(EMPTY, Ordering::Release);
                    shared.occupied.fetch_sub(1, Ordering::AcqRel);
                    shared.stats.record_pop();
                    return Ok(packet);
                }
                // stale view of a slot that was rewritten under us
                slot.state.store(READY, Ordering::Release);
                continue;
            }

            if shared.tail.load(Ordering::Acquire) != ticket {
                continue;
            }
            if claim == Some(Err(READING)) {
                // packet `ticket` is present but claimed by another consumer
                if contended < CONTENDED_RETRIES {
                    contended += 1;
                    backoff.spin();
                    continue;
                }
                return Err(PopError::Empty);
            }
            return Err(vacancy(shared, ticket));
        }
    }

    /// Return a spent packet to the producer's pool; false if the pool is full
    pub fn recycle(&self, packet: AudioPacket) -> bool {
        self.shared.recycle(packet)
    }

    /// Close the barrier from the consumer side
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// False once the producer handle has been dropped
    pub fn has_producer(&self) -> bool {
        self.shared.has_producer()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Clone for BarrierConsumer {
    fn clone(&self) -> Self {
        self.shared.live_consumers.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for BarrierConsumer {
    fn drop(&mut self) {
        self.shared.consumer_dropped();
    }
}

impl std::fmt::Debug for BarrierConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrierConsumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast cursor
// ─────────────────────────────────────────────────────────────────────────────

/// Independent read cursor of a broadcast-delivery barrier
///
/// Every cursor observes every packet once, in production order. A slot is
/// reused only after all cursors released it, so a stalled cursor stalls the
/// producer (or gets overwritten under [`OverrunPolicy::OverwriteOldest`]).
/// Dropping a cursor closes the barrier.
pub struct BroadcastCursor {
    shared: Arc<Shared>,
    id: usize,
    /// Production index this cursor reads next
    next: u64,
    missed: u64,
}

impl BroadcastCursor {
    pub(super) fn new(shared: Arc<Shared>, id: usize) -> Self {
        Self {
            shared,
            id,
            next: 0,
            missed: 0,
        }
    }

    /// Borrow the next packet without blocking
    ///
    /// The slot stays pinned until the returned guard is dropped.
    pub fn try_read(&mut self) -> Result<PacketRef<'_>, PopError> {
        let shared = &*self.shared;
        loop {
            let slot = shared.slot(self.next);
            slot.active.fetch_add(1, Ordering::SeqCst);
            let seq = slot.seq.load(Ordering::Acquire);
            let state = slot.state.load(Ordering::SeqCst);

            if seq == self.next && state == READY {
                // an overwrite may have completed between the two loads
                if slot.seq.load(Ordering::Acquire) == seq {
                    self.next += 1;
                    shared.stats.record_pop();
                    return Ok(PacketRef { shared, slot, seq });
                }
                slot.active.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            slot.active.fetch_sub(1, Ordering::SeqCst);

            if seq > self.next {
                // overwritten before this cursor got to it
                self.missed += 1;
                self.next += 1;
                continue;
            }
            return Err(vacancy(shared, self.next));
        }
    }

    /// Position of this cursor in the consumer list
    pub fn id(&self) -> usize {
        self.id
    }

    /// Production index of the next packet this cursor will read
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Packets overwritten before this cursor read them
    pub fn missed(&self) -> u64 {
        self.missed
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn has_producer(&self) -> bool {
        self.shared.has_producer()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for BroadcastCursor {
    fn drop(&mut self) {
        self.shared.consumer_dropped();
    }
}

impl std::fmt::Debug for BroadcastCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastCursor")
            .field("id", &self.id)
            .field("next", &self.next)
            .field("missed", &self.missed)
            .finish()
    }
}

/// Shared read guard over a broadcast slot
pub struct PacketRef<'a> {
    shared: &'a Shared,
    slot: &'a Slot,
    seq: u64,
}

impl PacketRef<'_> {
    /// Production index of this packet
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

impl Deref for PacketRef<'_> {
    type Target = AudioPacket;

    fn deref(&self) -> &AudioPacket {
        // SAFETY: the slot is READY and pinned by this guard
        unsafe { self.slot.get() }
    }
}

impl Drop for PacketRef<'_> {
    fn drop(&mut self) {
        // count down while still pinned so an overwrite cannot reset `pending` under us
        if self.slot.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.slot.state.store(EMPTY, Ordering::Release);
            self.shared.occupied.fetch_sub(1, Ordering::AcqRel);
        }
        self.slot.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PacketRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRef")
            .field("seq", &self.seq)
            .field("packet", &**self)
            .finish()
    }
}
