//! Real-time event reporting
//!
//! Device callbacks must not log, lock or allocate. They push small
//! [`RtEvent`] values into an `rtrb` ring instead; an [`EventDrain`] thread
//! empties the rings at a fixed interval and logs one summary line per kind.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::error::{AudioError, AudioResult};

/// Events per callback ring
///
/// Sized for a few seconds of one event per callback at small buffer sizes.
pub const EVENT_QUEUE_CAPACITY: usize = 512;

/// How often the drain thread wakes up
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(250);

/// Something that went wrong on a real-time thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtEvent {
    /// Capture data was dropped because the barrier was full
    CaptureOverrun { bytes: usize },
    /// An unread packet was overwritten to make room for capture data
    CaptureOverwrite,
    /// No pooled packet was available for capture data
    PoolExhausted { bytes: usize },
    /// Capture data could not be stored in a packet (misaligned or oversized)
    CaptureRejected { bytes: usize },
    /// Playback output was padded with silence
    PlaybackUnderrun { bytes: usize },
}

/// Real-time side of an event ring
///
/// [`send`](Self::send) never blocks; events that do not fit are counted and
/// reported by the drain.
pub struct RtEventSender {
    producer: rtrb::Producer<RtEvent>,
    lost: Arc<AtomicU64>,
}

impl RtEventSender {
    #[inline]
    pub fn send(&mut self, event: RtEvent) {
        if self.producer.push(event).is_err() {
            self.lost.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Drain side of an event ring
pub struct RtEventReceiver {
    consumer: rtrb::Consumer<RtEvent>,
    lost: Arc<AtomicU64>,
}

impl RtEventReceiver {
    pub fn try_recv(&mut self) -> Option<RtEvent> {
        self.consumer.pop().ok()
    }

    /// Events dropped on a full ring since the last call
    pub fn take_lost(&self) -> u64 {
        self.lost.swap(0, Ordering::Relaxed)
    }
}

/// Create an event ring for one real-time thread
pub fn rt_event_channel(capacity: usize) -> (RtEventSender, RtEventReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    let lost = Arc::new(AtomicU64::new(0));
    (
        RtEventSender {
            producer,
            lost: Arc::clone(&lost),
        },
        RtEventReceiver { consumer, lost },
    )
}

/// Per-interval totals, one entry per event kind
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventTally {
    pub capture_overruns: u64,
    pub capture_overrun_bytes: u64,
    pub capture_overwrites: u64,
    pub pool_exhausted: u64,
    pub capture_rejected: u64,
    pub playback_underruns: u64,
    pub playback_silence_bytes: u64,
    pub lost: u64,
}

impl EventTally {
    pub fn record(&mut self, event: RtEvent) {
        match event {
            RtEvent::CaptureOverrun { bytes } => {
                self.capture_overruns += 1;
                self.capture_overrun_bytes += bytes as u64;
            }
            RtEvent::CaptureOverwrite => self.capture_overwrites += 1,
            RtEvent::PoolExhausted { .. } => self.pool_exhausted += 1,
            RtEvent::CaptureRejected { .. } => self.capture_rejected += 1,
            RtEvent::PlaybackUnderrun { bytes } => {
                self.playback_underruns += 1;
                self.playback_silence_bytes += bytes as u64;
            }
        }
    }

    /// Drain every receiver into this tally
    pub fn collect(&mut self, receivers: &mut [RtEventReceiver]) {
        for receiver in receivers {
            while let Some(event) = receiver.try_recv() {
                self.record(event);
            }
            self.lost += receiver.take_lost();
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn merge(&mut self, other: &EventTally) {
        self.capture_overruns += other.capture_overruns;
        self.capture_overrun_bytes += other.capture_overrun_bytes;
        self.capture_overwrites += other.capture_overwrites;
        self.pool_exhausted += other.pool_exhausted;
        self.capture_rejected += other.capture_rejected;
        self.playback_underruns += other.playback_underruns;
        self.playback_silence_bytes += other.playback_silence_bytes;
        self.lost += other.lost;
    }

    fn log(&self) {
        if self.capture_overruns > 0 {
            log::warn!(
                "Capture overrun x{} ({} bytes dropped)",
                self.capture_overruns,
                self.capture_overrun_bytes
            );
        }
        if self.capture_overwrites > 0 {
            log::warn!("Capture overwrote {} unread packets", self.capture_overwrites);
        }
        if self.pool_exhausted > 0 {
            log::warn!("Packet pool exhausted x{}", self.pool_exhausted);
        }
        if self.capture_rejected > 0 {
            log::warn!("Capture buffer rejected x{}", self.capture_rejected);
        }
        if self.playback_underruns > 0 {
            log::warn!(
                "Playback underrun x{} ({} bytes of silence)",
                self.playback_underruns,
                self.playback_silence_bytes
            );
        }
        if self.lost > 0 {
            log::warn!("{} real-time events lost (event ring full)", self.lost);
        }
    }
}

/// Background thread logging real-time events
pub struct EventDrain {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<EventTally>>,
}

impl EventDrain {
    /// Spawn the drain over `receivers`, waking every `interval`
    pub fn spawn(mut receivers: Vec<RtEventReceiver>, interval: Duration) -> AudioResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread_handle = thread::Builder::new()
            .name("handoff-events".to_string())
            .spawn(move || {
                let mut total = EventTally::default();
                loop {
                    // read the flag first so the final pass sees every event
                    let keep_going = thread_running.load(Ordering::Acquire);
                    let mut tally = EventTally::default();
                    tally.collect(&mut receivers);
                    if !tally.is_empty() {
                        tally.log();
                        total.merge(&tally);
                    }
                    if !keep_going {
                        break;
                    }
                    thread::sleep(interval);
                }
                log::debug!("Event drain stopped");
                total
            })
            .map_err(|e| AudioError::ThreadSpawn {
                name: "handoff-events".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop after one last pass; returns everything seen over the drain's life
    pub fn stop(mut self) -> EventTally {
        self.shutdown().unwrap_or_default()
    }

    fn shutdown(&mut self) -> Option<EventTally> {
        self.running.store(false, Ordering::Release);
        self.thread_handle.take().and_then(|h| h.join().ok())
    }
}

impl Drop for EventDrain {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_ring_counts_lost() {
        let (mut tx, mut rx) = rt_event_channel(2);
        for _ in 0..5 {
            tx.send(RtEvent::CaptureOverwrite);
        }

        let mut tally = EventTally::default();
        tally.collect(std::slice::from_mut(&mut rx));
        assert_eq!(tally.capture_overwrites, 2);
        assert_eq!(tally.lost, 3);
        assert_eq!(rx.take_lost(), 0);
    }

    #[test]
    fn test_tally_sums_bytes() {
        let mut tally = EventTally::default();
        tally.record(RtEvent::PlaybackUnderrun { bytes: 100 });
        tally.record(RtEvent::PlaybackUnderrun { bytes: 28 });
        tally.record(RtEvent::CaptureOverrun { bytes: 64 });
        assert_eq!(tally.playback_underruns, 2);
        assert_eq!(tally.playback_silence_bytes, 128);
        assert_eq!(tally.capture_overrun_bytes, 64);
        assert!(!tally.is_empty());
    }

    #[test]
    fn test_drain_collects_until_stopped() {
        let (mut capture_tx, capture_rx) = rt_event_channel(16);
        let (mut playback_tx, playback_rx) = rt_event_channel(16);
        let drain = EventDrain::spawn(vec![capture_rx, playback_rx], Duration::from_millis(1)).unwrap();

        capture_tx.send(RtEvent::PoolExhausted { bytes: 32 });
        playback_tx.send(RtEvent::PlaybackUnderrun { bytes: 8 });
        assert!(drain.is_running());

        let total = drain.stop();
        assert_eq!(total.pool_exhausted, 1);
        assert_eq!(total.playback_underruns, 1);
    }
}
