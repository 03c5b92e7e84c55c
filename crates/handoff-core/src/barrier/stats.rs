//! Barrier counters
//!
//! Updated with relaxed atomics from both sides of the ring. Readers get a
//! [`StatsSnapshot`]; individual fields may be a few operations apart from
//! each other but each one is exact.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BarrierStats {
    pushed: AtomicU64,
    popped: AtomicU64,
    overruns: AtomicU64,
    overwritten: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of [`BarrierStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Packets published (including ones that overwrote older packets)
    pub pushed: u64,
    /// Packets handed to consumers (per read in broadcast mode)
    pub popped: u64,
    /// Pushes that found the ring full
    pub overruns: u64,
    /// Unread packets replaced under `OverwriteOldest`
    pub overwritten: u64,
    /// Pops that found nothing ready
    pub underruns: u64,
}

impl BarrierStats {
    #[inline]
    pub(super) fn record_push(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_pop(&self) {
        self.popped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_overwrite(&self) {
        self.overwritten.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}
