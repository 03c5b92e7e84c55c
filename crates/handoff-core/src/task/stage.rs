//! The three pipeline stage types and their tagged union

use std::time::Duration;

use super::{AudioTask, PacketSink, PacketSource, StepOutcome, TaskKind, TaskResult};
use crate::barrier::{BarrierConsumer, BarrierProducer, PopError, PushError, PushStatus};
use crate::filter::Filter;
use crate::packet::{AudioFormat, AudioPacket};

/// Audio duration of a formatted packet
fn packet_duration(packet: &AudioPacket) -> Option<Duration> {
    packet.format().map(|f| f.duration_of_bytes(packet.len()))
}

/// Push `packet`, keeping it in `pending` if the ring is full
///
/// Returns `Finished` once the barrier is closed.
fn forward(
    output: &mut BarrierProducer,
    pending: &mut Option<AudioPacket>,
    packet: AudioPacket,
) -> StepOutcome {
    match output.try_push(packet) {
        Ok(PushStatus::Pushed) => StepOutcome::Processed,
        Ok(PushStatus::Overwrote(old)) => {
            output.recycle(old);
            StepOutcome::Processed
        }
        Err(PushError::Full(packet)) => {
            *pending = Some(packet);
            StepOutcome::Idle
        }
        Err(PushError::Closed(packet)) => {
            output.recycle(packet);
            StepOutcome::Finished
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture
// ─────────────────────────────────────────────────────────────────────────────

/// Pulls packets from a [`PacketSource`] into a barrier
///
/// A packet refused by a full barrier is retried on the next step before the
/// source is asked for more, so nothing the source produced is lost under
/// [`OverrunPolicy::DropIncoming`](crate::barrier::OverrunPolicy).
pub struct CaptureTask {
    name: String,
    source: Box<dyn PacketSource>,
    output: BarrierProducer,
    packet_bytes: usize,
    pending: Option<AudioPacket>,
    budget: Option<Duration>,
}

impl CaptureTask {
    pub fn new(source: Box<dyn PacketSource>, output: BarrierProducer, packet_bytes: usize) -> Self {
        Self {
            name: format!("capture-{}", source.name()),
            source,
            output,
            packet_bytes,
            pending: None,
            budget: None,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.source.format()
    }
}

impl AudioTask for CaptureTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Capture
    }

    fn stop(&mut self) {
        if let Some(packet) = self.pending.take() {
            self.output.recycle(packet);
        }
        self.output.close();
    }

    fn step(&mut self) -> TaskResult<StepOutcome> {
        if self.output.is_closed() {
            return Ok(StepOutcome::Finished);
        }
        if let Some(packet) = self.pending.take() {
            return Ok(forward(&mut self.output, &mut self.pending, packet));
        }

        let format = self.source.format();
        let mut packet = self.output.acquire_or_allocate(format, self.packet_bytes);
        packet.clear();
        packet.set_format(format)?;

        let filled = match self.source.fill(&mut packet) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.output.recycle(packet);
                return Err(e);
            }
        };
        match filled {
            StepOutcome::Processed => {
                self.budget = packet_duration(&packet);
                let outcome = forward(&mut self.output, &mut self.pending, packet);
                // the source did its work even if the push has to be retried
                Ok(match outcome {
                    StepOutcome::Idle => StepOutcome::Processed,
                    other => other,
                })
            }
            StepOutcome::Idle => {
                self.output.recycle(packet);
                Ok(StepOutcome::Idle)
            }
            StepOutcome::Finished => {
                self.output.recycle(packet);
                self.output.close();
                Ok(StepOutcome::Finished)
            }
        }
    }

    fn packet_budget(&self) -> Option<Duration> {
        self.budget
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter
// ─────────────────────────────────────────────────────────────────────────────

/// Moves packets from one barrier to the next through a [`Filter`]
///
/// Output buffers come from the downstream pool; spent input buffers go back
/// to the upstream pool. When the input barrier is closed and drained the
/// output barrier is closed too, so shutdown ripples down the pipeline.
pub struct FilterTask {
    name: String,
    filter: Box<dyn Filter>,
    input: BarrierConsumer,
    output: BarrierProducer,
    out_format: AudioFormat,
    out_bytes: usize,
    pending: Option<AudioPacket>,
    budget: Option<Duration>,
}

impl FilterTask {
    pub fn new(
        name: impl Into<String>,
        filter: Box<dyn Filter>,
        input: BarrierConsumer,
        output: BarrierProducer,
        out_format: AudioFormat,
        out_bytes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            filter,
            input,
            output,
            out_format,
            out_bytes,
            pending: None,
            budget: None,
        }
    }

    pub fn output_format(&self) -> AudioFormat {
        self.out_format
    }

    fn process(&mut self, packet: &AudioPacket) -> TaskResult<AudioPacket> {
        let needed = self.filter.output_capacity(packet)?.max(self.out_bytes);
        let mut out = self.output.acquire_or_allocate(self.out_format, needed);
        if let Err(e) = self.filter.transform(packet, &mut out) {
            self.output.recycle(out);
            return Err(e.into());
        }
        Ok(out)
    }
}

impl AudioTask for FilterTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Filter
    }

    fn start(&mut self) -> TaskResult<()> {
        self.filter.reset();
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(packet) = self.pending.take() {
            self.output.recycle(packet);
        }
        self.output.close();
    }

    fn step(&mut self) -> TaskResult<StepOutcome> {
        if let Some(packet) = self.pending.take() {
            return Ok(forward(&mut self.output, &mut self.pending, packet));
        }

        let packet = match self.input.try_pop() {
            Ok(packet) => packet,
            Err(PopError::Empty) => return Ok(StepOutcome::Idle),
            Err(PopError::Closed) => {
                self.output.close();
                return Ok(StepOutcome::Finished);
            }
        };

        self.budget = packet_duration(&packet);
        let result = self.process(&packet);
        self.input.recycle(packet);
        let out = result?;

        Ok(match forward(&mut self.output, &mut self.pending, out) {
            StepOutcome::Idle => StepOutcome::Processed,
            other => other,
        })
    }

    fn packet_budget(&self) -> Option<Duration> {
        self.budget
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Delivers packets from a barrier to a [`PacketSink`]
pub struct PlaybackTask {
    name: String,
    input: BarrierConsumer,
    sink: Box<dyn PacketSink>,
    /// Set after an underrun was reported, cleared by the next packet
    starved: bool,
    delivered: u64,
    budget: Option<Duration>,
}

impl PlaybackTask {
    pub fn new(input: BarrierConsumer, sink: Box<dyn PacketSink>) -> Self {
        Self {
            name: format!("playback-{}", sink.name()),
            input,
            sink,
            starved: false,
            delivered: 0,
            budget: None,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl AudioTask for PlaybackTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Playback
    }

    fn step(&mut self) -> TaskResult<StepOutcome> {
        let packet = match self.input.try_pop() {
            Ok(packet) => packet,
            Err(PopError::Empty) => {
                // one report per gap, and only once data has flowed
                if self.delivered > 0 && !self.starved {
                    self.starved = true;
                    self.sink.on_underrun();
                }
                return Ok(StepOutcome::Idle);
            }
            Err(PopError::Closed) => return Ok(StepOutcome::Finished),
        };

        self.starved = false;
        self.budget = packet_duration(&packet);
        let result = self.sink.consume(&packet);
        self.input.recycle(packet);
        result?;
        self.delivered += 1;
        Ok(StepOutcome::Processed)
    }

    fn packet_budget(&self) -> Option<Duration> {
        self.budget
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage
// ─────────────────────────────────────────────────────────────────────────────

/// Any pipeline stage, dispatched without boxing
pub enum Stage {
    Capture(CaptureTask),
    Filter(FilterTask),
    Playback(PlaybackTask),
}

impl Stage {
    fn task(&self) -> &dyn AudioTask {
        match self {
            Stage::Capture(t) => t,
            Stage::Filter(t) => t,
            Stage::Playback(t) => t,
        }
    }

    fn task_mut(&mut self) -> &mut dyn AudioTask {
        match self {
            Stage::Capture(t) => t,
            Stage::Filter(t) => t,
            Stage::Playback(t) => t,
        }
    }
}

impl AudioTask for Stage {
    fn name(&self) -> &str {
        self.task().name()
    }

    fn kind(&self) -> TaskKind {
        self.task().kind()
    }

    fn start(&mut self) -> TaskResult<()> {
        self.task_mut().start()
    }

    fn stop(&mut self) {
        self.task_mut().stop()
    }

    fn step(&mut self) -> TaskResult<StepOutcome> {
        self.task_mut().step()
    }

    fn packet_budget(&self) -> Option<Duration> {
        self.task().packet_budget()
    }
}

impl From<CaptureTask> for Stage {
    fn from(task: CaptureTask) -> Self {
        Stage::Capture(task)
    }
}

impl From<FilterTask> for Stage {
    fn from(task: FilterTask) -> Self {
        Stage::Filter(task)
    }
}

impl From<PlaybackTask> for Stage {
    fn from(task: PlaybackTask) -> Self {
        Stage::Playback(task)
    }
}
