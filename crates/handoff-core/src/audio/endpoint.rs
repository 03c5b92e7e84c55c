//! Device-callback ends of a pipeline
//!
//! Both endpoints run on the audio driver's real-time thread. They only
//! touch the barrier and its packet pool, never allocate, and report
//! problems through an optional [`RtEventSender`].

use super::events::{RtEvent, RtEventSender};
use crate::barrier::{
    BarrierConsumer, BarrierProducer, PopError, PushError, PushStatus, StatsSnapshot,
};
use crate::packet::{AudioFormat, AudioPacket};

/// Feeds captured device buffers into a barrier
pub struct CaptureEndpoint {
    producer: BarrierProducer,
    format: AudioFormat,
    events: Option<RtEventSender>,
}

impl CaptureEndpoint {
    pub fn new(producer: BarrierProducer, format: AudioFormat, events: Option<RtEventSender>) -> Self {
        Self {
            producer,
            format,
            events,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Copy `raw` into pooled packets and push them without blocking
    ///
    /// A buffer larger than a pooled packet is split across several. Returns
    /// false if any part of `raw` was dropped.
    pub fn on_capture_ready(&mut self, raw: &[u8]) -> bool {
        let mut offset = 0;
        while offset < raw.len() {
            let remaining = raw.len() - offset;
            let Some(mut packet) = self.producer.acquire() else {
                self.emit(RtEvent::PoolExhausted { bytes: remaining });
                return false;
            };

            let room = self.format.frames_to_bytes(self.format.bytes_to_frames(packet.capacity()));
            let take = room.min(remaining);
            packet.clear();
            let stored = take > 0
                && packet.set_format(self.format).is_ok()
                && packet.assign(&raw[offset..offset + take], 0).is_ok();
            if !stored {
                self.producer.recycle(packet);
                self.emit(RtEvent::CaptureRejected { bytes: remaining });
                return false;
            }

            match self.producer.try_push(packet) {
                Ok(PushStatus::Pushed) => {}
                Ok(PushStatus::Overwrote(old)) => {
                    self.producer.recycle(old);
                    self.emit(RtEvent::CaptureOverwrite);
                }
                Err(PushError::Full(packet)) => {
                    self.producer.recycle(packet);
                    self.emit(RtEvent::CaptureOverrun { bytes: remaining });
                    return false;
                }
                Err(PushError::Closed(packet)) => {
                    self.producer.recycle(packet);
                    return false;
                }
            }
            offset += take;
        }
        true
    }

    /// Stop accepting capture data; downstream drains and then finishes
    pub fn close(&self) {
        self.producer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.producer.is_closed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.producer.stats()
    }

    #[inline]
    fn emit(&mut self, event: RtEvent) {
        if let Some(events) = &mut self.events {
            events.send(event);
        }
    }
}

/// Fills device output buffers from a barrier
///
/// Packet and device buffer sizes need not match: the unread tail of a
/// packet is carried into the next callback.
pub struct PlaybackEndpoint {
    consumer: BarrierConsumer,
    format: AudioFormat,
    current: Option<AudioPacket>,
    offset: usize,
    /// Data has been played at least once
    primed: bool,
    events: Option<RtEventSender>,
}

impl PlaybackEndpoint {
    pub fn new(consumer: BarrierConsumer, format: AudioFormat, events: Option<RtEventSender>) -> Self {
        Self {
            consumer,
            format,
            current: None,
            offset: 0,
            primed: false,
            events,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Fill `out` with queued audio, padding with silence on underrun
    ///
    /// Returns true if `out` was filled entirely with audio.
    pub fn on_playback_needed(&mut self, out: &mut [u8]) -> bool {
        let mut written = 0;

        while written < out.len() {
            let packet = match self.current.take() {
                Some(packet) => packet,
                None => match self.consumer.try_pop() {
                    Ok(packet) => {
                        self.offset = 0;
                        packet
                    }
                    Err(PopError::Empty) | Err(PopError::Closed) => break,
                },
            };

            let available = &packet.as_bytes()[self.offset.min(packet.len())..];
            let count = available.len().min(out.len() - written);
            out[written..written + count].copy_from_slice(&available[..count]);
            written += count;
            self.offset += count;

            if self.offset >= packet.len() {
                self.consumer.recycle(packet);
                self.offset = 0;
            } else {
                self.current = Some(packet);
            }
        }

        if written > 0 {
            self.primed = true;
        }
        if written < out.len() {
            out[written..].fill(self.format.silence_byte());
            if self.primed && !self.is_drained() {
                self.emit(RtEvent::PlaybackUnderrun {
                    bytes: out.len() - written,
                });
            }
            return false;
        }
        true
    }

    /// Upstream closed and every queued byte has been played
    pub fn is_drained(&self) -> bool {
        self.current.is_none() && self.consumer.is_closed() && self.consumer.is_empty()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.consumer.stats()
    }

    #[inline]
    fn emit(&mut self, event: RtEvent) {
        if let Some(events) = &mut self.events {
            events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::events::{rt_event_channel, EventTally};
    use crate::barrier::{OverrunPolicy, PacketBarrier};

    fn format() -> AudioFormat {
        AudioFormat::pcm_i16(1, 48000).unwrap()
    }

    #[test]
    fn test_capture_splits_large_buffers() {
        let (producer, consumer) = PacketBarrier::spsc(4, OverrunPolicy::DropIncoming).unwrap();
        producer.prefill(4, format(), 4);
        let mut capture = CaptureEndpoint::new(producer, format(), None);

        assert!(capture.on_capture_ready(&[1, 0, 2, 0, 3, 0]));
        assert_eq!(consumer.try_pop().unwrap().as_bytes(), &[1, 0, 2, 0]);
        assert_eq!(consumer.try_pop().unwrap().as_bytes(), &[3, 0]);
    }

    #[test]
    fn test_capture_overrun_reports_event() {
        let (producer, consumer) = PacketBarrier::spsc(2, OverrunPolicy::DropIncoming).unwrap();
        producer.prefill(4, format(), 4);
        let (tx, mut rx) = rt_event_channel(8);
        let mut capture = CaptureEndpoint::new(producer, format(), Some(tx));

        assert!(capture.on_capture_ready(&[1, 0]));
        assert!(capture.on_capture_ready(&[2, 0]));
        assert!(!capture.on_capture_ready(&[3, 0]));

        let mut tally = EventTally::default();
        tally.collect(std::slice::from_mut(&mut rx));
        assert_eq!(tally.capture_overruns, 1);
        assert_eq!(consumer.stats().overruns, 1);
        // the refused packet went back to the pool
        assert_eq!(consumer.try_pop().unwrap().as_bytes(), &[1, 0]);
    }

    #[test]
    fn test_capture_without_pool_drops() {
        let (producer, _consumer) = PacketBarrier::spsc(2, OverrunPolicy::DropIncoming).unwrap();
        let (tx, mut rx) = rt_event_channel(8);
        let mut capture = CaptureEndpoint::new(producer, format(), Some(tx));

        assert!(!capture.on_capture_ready(&[1, 0]));
        assert_eq!(rx.try_recv(), Some(RtEvent::PoolExhausted { bytes: 2 }));
    }

    #[test]
    fn test_playback_carries_partial_packets() {
        let (mut producer, consumer) = PacketBarrier::spsc(4, OverrunPolicy::DropIncoming).unwrap();
        let mut playback = PlaybackEndpoint::new(consumer, format(), None);

        for chunk in [[1u8, 0, 2, 0, 3, 0], [4, 0, 5, 0, 6, 0]] {
            let mut packet = AudioPacket::with_format(format(), 6);
            packet.assign(&chunk, 0).unwrap();
            producer.try_push(packet).unwrap();
        }

        let mut out = [0u8; 4];
        assert!(playback.on_playback_needed(&mut out));
        assert_eq!(out, [1, 0, 2, 0]);
        assert!(playback.on_playback_needed(&mut out));
        assert_eq!(out, [3, 0, 4, 0]);
        assert!(playback.on_playback_needed(&mut out));
        assert_eq!(out, [5, 0, 6, 0]);
    }

    #[test]
    fn test_playback_underrun_fills_silence() {
        let format = AudioFormat::new(1, 8000, 8, crate::packet::SampleEncoding::PcmInt).unwrap();
        let (mut producer, consumer) = PacketBarrier::spsc(2, OverrunPolicy::DropIncoming).unwrap();
        let (tx, mut rx) = rt_event_channel(8);
        let mut playback = PlaybackEndpoint::new(consumer, format, Some(tx));

        let mut out = [7u8; 4];
        // silence before anything was played is not an underrun
        assert!(!playback.on_playback_needed(&mut out));
        assert_eq!(out, [0x80; 4]);
        assert_eq!(rx.try_recv(), None);

        let mut packet = AudioPacket::with_format(format, 2);
        packet.assign(&[10, 20], 0).unwrap();
        producer.try_push(packet).unwrap();

        assert!(!playback.on_playback_needed(&mut out));
        assert_eq!(out, [10, 20, 0x80, 0x80]);
        assert_eq!(rx.try_recv(), Some(RtEvent::PlaybackUnderrun { bytes: 2 }));
    }

    #[test]
    fn test_playback_drained_after_close() {
        let (mut producer, consumer) = PacketBarrier::spsc(2, OverrunPolicy::DropIncoming).unwrap();
        let mut playback = PlaybackEndpoint::new(consumer, format(), None);
        let mut packet = AudioPacket::with_format(format(), 4);
        packet.assign(&[1, 0, 2, 0], 0).unwrap();
        producer.try_push(packet).unwrap();
        drop(producer);

        assert!(!playback.is_drained());
        let mut out = [0u8; 2];
        playback.on_playback_needed(&mut out);
        assert!(!playback.is_drained());
        playback.on_playback_needed(&mut out);
        assert!(playback.is_drained());
    }
}
