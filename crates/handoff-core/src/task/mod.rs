//! Processing stages and the worker threads that drive them
//!
//! # Architecture
//!
//! ```text
//!  PacketSource ─▶ CaptureTask ─▶ [barrier] ─▶ FilterTask ─▶ [barrier] ─▶ PlaybackTask ─▶ PacketSink
//!                       │                          │                            │
//!                   worker thread             worker thread               worker thread
//! ```
//!
//! Each stage implements [`AudioTask`]. A runner thread calls
//! [`AudioTask::step`] in a loop: `Processed` means a packet moved,
//! `Idle` means there was nothing to do (the runner backs off), `Finished`
//! means the upstream barrier closed and drained.
//!
//! Stages never block on each other. They only talk through barriers, so a
//! slow stage shows up as overruns upstream and underruns downstream instead
//! of stalling the device callbacks.

mod error;
mod pipeline;
mod runner;
mod source;
mod stage;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use error::{TaskError, TaskResult};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineState, DEFAULT_DRAIN_TIMEOUT, DEFAULT_PACKET_FRAMES,
    DEFAULT_PREFILL_PACKETS,
};
pub use runner::{spawn_task, TaskHandle, TaskReport};
pub use source::ToneSource;
pub use stage::{CaptureTask, FilterTask, PlaybackTask, Stage};

use crate::packet::{AudioFormat, AudioPacket};

/// Role of a stage in a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Produces packets, no input barrier
    Capture,
    /// Consumes from one barrier, produces into another
    Filter,
    /// Consumes packets, no output barrier
    Playback,
}

/// Result of one [`AudioTask::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A packet was moved
    Processed,
    /// Nothing to do right now
    Idle,
    /// The stage is done for good
    Finished,
}

/// Shared cancellation flag
///
/// Cloned into a worker; any clone can request the stop.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A pipeline stage
pub trait AudioTask: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    /// Called on the worker thread before the first step
    fn start(&mut self) -> TaskResult<()> {
        Ok(())
    }

    /// Called on the worker thread after the last step
    fn stop(&mut self) {}

    /// Move at most one packet; must not block
    fn step(&mut self) -> TaskResult<StepOutcome>;

    /// Audio duration of the packet handled by the last `Processed` step
    ///
    /// A step that takes longer than this cannot keep up with real time.
    fn packet_budget(&self) -> Option<Duration> {
        None
    }
}

/// Pull-model packet producer driven by a [`CaptureTask`]
pub trait PacketSource: Send {
    fn name(&self) -> &str;

    fn format(&self) -> AudioFormat;

    /// Fill `packet` (cleared, tagged with [`format`](Self::format))
    ///
    /// Returns `Processed` when data was written, `Idle` when nothing is
    /// available yet, `Finished` when the source is exhausted.
    fn fill(&mut self, packet: &mut AudioPacket) -> TaskResult<StepOutcome>;
}

/// Packet consumer driven by a [`PlaybackTask`]
pub trait PacketSink: Send {
    fn name(&self) -> &str;

    fn consume(&mut self, packet: &AudioPacket) -> TaskResult<()>;

    /// Called when the input barrier had nothing ready
    fn on_underrun(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_token_shared() {
        let token = StopToken::new();
        let worker = token.clone();
        assert!(!worker.is_stopped());
        token.stop();
        assert!(worker.is_stopped());
    }
}
