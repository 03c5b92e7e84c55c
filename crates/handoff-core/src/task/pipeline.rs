//! Wiring stages and barriers into a running pipeline
//!
//! ```text
//!  capture endpoint ─┐                                            ┌─ playback endpoint
//!     or             ├─▶ [b0] ─▶ filter 0 ─▶ [b1] ─▶ ... ─▶ [bN] ─┤     or
//!  CaptureTask ──────┘                                            └─ PlaybackTask
//! ```
//!
//! Each filter gets its own worker thread and its own output barrier. Every
//! barrier's pool is prefilled for the format flowing through it, so the
//! steady state allocates nothing.
//!
//! Shutdown is two-phase. Closing `b0` lets every stage finish the packets
//! already queued and then finish on its own as the close ripples down; only
//! stages still running after the drain timeout are stopped through the
//! shared [`StopToken`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{
    spawn_task, AudioTask, CaptureTask, FilterTask, PacketSink, PacketSource, PlaybackTask, Stage,
    StopToken, TaskError, TaskHandle, TaskReport, TaskResult,
};
use crate::audio::{
    rt_event_channel, CaptureEndpoint, EventDrain, PlaybackEndpoint, RtEventReceiver,
    DEFAULT_DRAIN_INTERVAL, EVENT_QUEUE_CAPACITY,
};
use crate::barrier::{
    BarrierCloser, BarrierConfig, BarrierConsumer, BarrierProducer, PacketBarrier, SpinBarrier,
    StatsSnapshot,
};
use crate::filter::Filter;
use crate::packet::AudioFormat;

/// How long shutdown waits for queued packets to flow out
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Frames per packet when none is given
pub const DEFAULT_PACKET_FRAMES: usize = 480;

/// Packets preallocated per barrier pool when none is given
pub const DEFAULT_PREFILL_PACKETS: usize = 8;

/// Byte size of a packet holding `frames` frames of `input` after conversion to `output`
fn scaled_packet_bytes(input: &AudioFormat, output: &AudioFormat, frames: usize) -> usize {
    let out_frames = (frames as u64 * u64::from(output.sample_rate()))
        .div_ceil(u64::from(input.sample_rate()));
    output.frames_to_bytes(out_frames as usize)
}

fn make_barrier(
    config: &BarrierConfig,
    format: AudioFormat,
    packet_bytes: usize,
    prefill: usize,
) -> TaskResult<(BarrierProducer, BarrierConsumer)> {
    let (producer, consumer) = PacketBarrier::spsc(config.slot_count, config.overrun_policy)?;
    producer.prefill(prefill, format, packet_bytes);
    Ok((producer, consumer))
}

/// Lifecycle of a [`Pipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Built,
    Running,
    Stopped,
}

/// Configures and builds a [`Pipeline`]
pub struct PipelineBuilder {
    format: AudioFormat,
    packet_frames: usize,
    prefill_packets: usize,
    barrier: BarrierConfig,
    filters: Vec<Box<dyn Filter>>,
    source: Option<Box<dyn PacketSource>>,
    sink: Option<Box<dyn PacketSink>>,
    events: bool,
}

impl PipelineBuilder {
    /// Pipeline whose capture side delivers `format`
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            packet_frames: DEFAULT_PACKET_FRAMES,
            prefill_packets: DEFAULT_PREFILL_PACKETS,
            barrier: BarrierConfig::default(),
            filters: Vec::new(),
            source: None,
            sink: None,
            events: true,
        }
    }

    pub fn packet_frames(mut self, frames: usize) -> Self {
        self.packet_frames = frames.max(1);
        self
    }

    pub fn prefill_packets(mut self, count: usize) -> Self {
        self.prefill_packets = count;
        self
    }

    /// Slot count and overrun policy for every barrier
    ///
    /// Each barrier has a single consumer regardless of `consumer_count`.
    pub fn barrier(mut self, config: BarrierConfig) -> Self {
        self.barrier = config;
        self
    }

    /// Append a filter stage
    pub fn filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Drive the input from a source instead of a capture endpoint
    pub fn source(mut self, source: Box<dyn PacketSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Deliver the output to a sink instead of a playback endpoint
    pub fn sink(mut self, sink: Box<dyn PacketSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report real-time events from the endpoints (on by default)
    pub fn rt_events(mut self, enabled: bool) -> Self {
        self.events = enabled;
        self
    }

    pub fn build(self) -> TaskResult<Pipeline> {
        self.barrier.validate()?;
        if let Some(source) = &self.source {
            if source.format() != self.format {
                return Err(crate::packet::PacketError::FormatMismatch {
                    expected: self.format,
                    actual: source.format(),
                }
                .into());
            }
        }

        let mut stages: Vec<Stage> = Vec::new();
        let mut receivers: Vec<RtEventReceiver> = Vec::new();
        let mut format = self.format;
        let mut packet_bytes = format.frames_to_bytes(self.packet_frames);

        let (input, mut upstream) =
            make_barrier(&self.barrier, format, packet_bytes, self.prefill_packets)?;
        let closer = input.closer();
        let mut barrier_stats = vec![closer.clone()];

        let capture = match self.source {
            Some(source) => {
                stages.push(CaptureTask::new(source, input, packet_bytes).into());
                None
            }
            None => {
                let events = self.events.then(|| {
                    let (tx, rx) = rt_event_channel(EVENT_QUEUE_CAPACITY);
                    receivers.push(rx);
                    tx
                });
                Some(CaptureEndpoint::new(input, format, events))
            }
        };

        for (index, filter) in self.filters.into_iter().enumerate() {
            let out_format = filter.output_format(&format)?;
            let frames = format.bytes_to_frames(packet_bytes);
            let out_bytes = scaled_packet_bytes(&format, &out_format, frames);
            let (output, next) =
                make_barrier(&self.barrier, out_format, out_bytes, self.prefill_packets)?;
            barrier_stats.push(output.closer());

            let name = format!("filter-{}-{}", index, filter.info().name);
            log::debug!("Stage {}: {} -> {}", name, format, out_format);
            let task = FilterTask::new(name, filter, upstream, output, out_format, out_bytes);
            stages.push(task.into());

            upstream = next;
            format = out_format;
            packet_bytes = out_bytes;
        }

        let playback = match self.sink {
            Some(sink) => {
                stages.push(PlaybackTask::new(upstream, sink).into());
                None
            }
            None => {
                let events = self.events.then(|| {
                    let (tx, rx) = rt_event_channel(EVENT_QUEUE_CAPACITY);
                    receivers.push(rx);
                    tx
                });
                Some(PlaybackEndpoint::new(upstream, format, events))
            }
        };

        log::info!(
            "Pipeline built: {} -> {}, {} stages, {} barriers of {} slots",
            self.format,
            format,
            stages.len(),
            barrier_stats.len(),
            self.barrier.slot_count
        );

        Ok(Pipeline {
            state: PipelineState::Built,
            input_format: self.format,
            output_format: format,
            stages,
            handles: Vec::new(),
            capture,
            playback,
            closer,
            barriers: barrier_stats,
            receivers,
            drain: None,
            stop: StopToken::new(),
        })
    }
}

/// A chain of stages connected by barriers
pub struct Pipeline {
    state: PipelineState,
    input_format: AudioFormat,
    output_format: AudioFormat,
    stages: Vec<Stage>,
    handles: Vec<TaskHandle>,
    capture: Option<CaptureEndpoint>,
    playback: Option<PlaybackEndpoint>,
    /// Closes the first barrier
    closer: BarrierCloser,
    barriers: Vec<BarrierCloser>,
    receivers: Vec<RtEventReceiver>,
    drain: Option<EventDrain>,
    stop: StopToken,
}

impl Pipeline {
    pub fn builder(format: AudioFormat) -> PipelineBuilder {
        PipelineBuilder::new(format)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn input_format(&self) -> AudioFormat {
        self.input_format
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output_format
    }

    /// Names of the worker stages in order
    pub fn stage_names(&self) -> Vec<String> {
        if self.handles.is_empty() {
            self.stages.iter().map(|s| s.name().to_string()).collect()
        } else {
            self.handles.iter().map(|h| h.name().to_string()).collect()
        }
    }

    /// Endpoint to hand to the capture device
    pub fn take_capture_endpoint(&mut self) -> Option<CaptureEndpoint> {
        self.capture.take()
    }

    /// Endpoint to hand to the playback device
    pub fn take_playback_endpoint(&mut self) -> Option<PlaybackEndpoint> {
        self.playback.take()
    }

    /// Counters of every barrier, first to last
    pub fn barrier_stats(&self) -> Vec<StatsSnapshot> {
        self.barriers.iter().map(BarrierCloser::stats).collect()
    }

    /// Spawn every stage and release them together
    pub fn start(&mut self) -> TaskResult<()> {
        if self.state != PipelineState::Built {
            return Err(TaskError::Pipeline(format!(
                "cannot start a pipeline in state {:?}",
                self.state
            )));
        }

        let gate = Arc::new(SpinBarrier::new(self.stages.len() + 1));
        for stage in std::mem::take(&mut self.stages) {
            match spawn_task(stage, self.stop.clone(), Some(Arc::clone(&gate))) {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    self.stop.stop();
                    self.closer.close();
                    gate.release();
                    let _ = self.join_all();
                    self.state = PipelineState::Stopped;
                    return Err(e);
                }
            }
        }

        if !self.receivers.is_empty() {
            let receivers = std::mem::take(&mut self.receivers);
            match EventDrain::spawn(receivers, DEFAULT_DRAIN_INTERVAL) {
                Ok(drain) => self.drain = Some(drain),
                Err(e) => log::warn!("Real-time events will not be logged: {}", e),
            }
        }

        gate.wait();
        self.state = PipelineState::Running;
        log::info!("Pipeline started with {} workers", self.handles.len());
        Ok(())
    }

    /// Workers that have not finished yet
    pub fn running_tasks(&self) -> usize {
        self.handles.iter().filter(|h| h.is_running()).count()
    }

    /// Two-phase stop
    ///
    /// 1. close the first barrier and wait up to `drain_timeout` for the
    ///    stages to flush queued packets and finish
    /// 2. stop whatever is still running and join every worker
    pub fn shutdown(&mut self, drain_timeout: Duration) -> TaskResult<Vec<TaskReport>> {
        if self.state == PipelineState::Stopped {
            return Ok(Vec::new());
        }

        self.closer.close();
        let deadline = Instant::now() + drain_timeout;
        while self.running_tasks() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let stragglers = self.running_tasks();
        if stragglers > 0 {
            log::warn!(
                "{} stages still running after {:?}, stopping them",
                stragglers,
                drain_timeout
            );
        }

        self.stop.stop();
        let reports = self.join_all();
        if let Some(drain) = self.drain.take() {
            drain.stop();
        }
        self.state = PipelineState::Stopped;
        log::info!("Pipeline stopped");
        reports
    }

    fn join_all(&mut self) -> TaskResult<Vec<TaskReport>> {
        let mut reports = Vec::with_capacity(self.handles.len());
        let mut panicked = None;
        for handle in self.handles.drain(..) {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(e) => {
                    log::error!("{}", e);
                    panicked.get_or_insert(e);
                }
            }
        }
        match panicked {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            let _ = self.shutdown(Duration::ZERO);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::OverrunPolicy;
    use crate::filter::native::{ChannelMap, Gain, NearestResampler};
    use crate::packet::AudioPacket;
    use crate::task::ToneSource;

    type Seen = Arc<Mutex<Vec<(Option<AudioFormat>, usize)>>>;
    use std::sync::Mutex;

    /// Records every packet it is given
    struct Recorder {
        packets: Seen,
    }

    impl PacketSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn consume(&mut self, packet: &AudioPacket) -> TaskResult<()> {
            self.packets
                .lock()
                .unwrap()
                .push((packet.format(), packet.frame_count()));
            Ok(())
        }
    }

    fn recorder() -> (Box<Recorder>, Seen) {
        let packets = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Recorder {
                packets: Arc::clone(&packets),
            }),
            packets,
        )
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_source_to_sink_through_filters() {
        let format = AudioFormat::pcm_f32(2, 48000).unwrap();
        let (sink, packets) = recorder();
        let mut pipeline = Pipeline::builder(format)
            .packet_frames(480)
            .barrier(BarrierConfig::new(4))
            .source(Box::new(ToneSource::new(format, 440.0, 0.5, 480).with_limit(20)))
            .filter(Box::new(Gain::new(0.5).unwrap()))
            .filter(Box::new(NearestResampler::new(24000).unwrap()))
            .filter(Box::new(ChannelMap::new(1).unwrap()))
            .sink(sink)
            .build()
            .unwrap();

        assert_eq!(pipeline.output_format(), AudioFormat::pcm_f32(1, 24000).unwrap());
        assert_eq!(pipeline.stage_names().len(), 5);
        assert!(pipeline.take_capture_endpoint().is_none());

        pipeline.start().unwrap();
        // the source is finite, so every stage finishes on its own
        wait_for(|| pipeline.running_tasks() == 0);
        let reports = pipeline.shutdown(DEFAULT_DRAIN_TIMEOUT).unwrap();

        let packets = packets.lock().unwrap();
        assert_eq!(packets.len(), 20);
        for (format, frames) in packets.iter() {
            assert_eq!(*format, Some(AudioFormat::pcm_f32(1, 24000).unwrap()));
            assert_eq!(*frames, 240);
        }
        assert_eq!(reports.len(), 5);
        assert!(reports.iter().all(|r| r.error.is_none()));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.barrier_stats().len(), 4);
    }

    #[test]
    fn test_endpoints_drain_on_shutdown() {
        let format = AudioFormat::pcm_i16(1, 48000).unwrap();
        let mut pipeline = Pipeline::builder(format)
            .packet_frames(4)
            .barrier(BarrierConfig::new(8).with_policy(OverrunPolicy::DropIncoming))
            .filter(Box::new(Gain::new(2.0).unwrap()))
            .rt_events(false)
            .build()
            .unwrap();

        let mut capture = pipeline.take_capture_endpoint().unwrap();
        let mut playback = pipeline.take_playback_endpoint().unwrap();
        pipeline.start().unwrap();

        let samples: [i16; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        assert!(capture.on_capture_ready(bytemuck::cast_slice(&samples)));

        let mut out = [0i16; 8];
        wait_for(|| pipeline.barrier_stats()[1].pushed == 2);
        assert!(playback.on_playback_needed(bytemuck::cast_slice_mut(&mut out)));
        assert_eq!(out, [2, 4, 6, 8, 10, 12, 14, 16]);

        let reports = pipeline.shutdown(DEFAULT_DRAIN_TIMEOUT).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].processed, 2);
        assert!(capture.is_closed());
        assert!(playback.is_drained());
    }

    #[test]
    fn test_start_twice_fails() {
        let format = AudioFormat::pcm_i16(2, 44100).unwrap();
        let mut pipeline = Pipeline::builder(format).build().unwrap();
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(TaskError::Pipeline(_))));
        pipeline.shutdown(Duration::ZERO).unwrap();
        assert!(pipeline.shutdown(Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_source_format_must_match() {
        let format = AudioFormat::pcm_i16(2, 44100).unwrap();
        let other = AudioFormat::pcm_f32(2, 44100).unwrap();
        let result = Pipeline::builder(format)
            .source(Box::new(ToneSource::new(other, 440.0, 0.5, 64)))
            .build();
        assert!(matches!(result, Err(TaskError::Packet(_))));
    }

    #[test]
    fn test_scaled_packet_bytes() {
        let input = AudioFormat::pcm_i16(2, 44100).unwrap();
        let output = AudioFormat::pcm_f32(1, 48000).unwrap();
        // 441 frames at 44.1kHz become 480 at 48kHz
        assert_eq!(scaled_packet_bytes(&input, &output, 441), 480 * 4);
    }
}
