//! Task error types

use thiserror::Error;

use crate::barrier::BarrierError;
use crate::filter::FilterError;
use crate::packet::{FormatError, PacketError};

/// Errors raised by processing stages and their runner
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// A filter failed to transform a packet
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// A packet operation failed inside a stage
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Barrier construction failed while wiring a pipeline
    #[error("Barrier error: {0}")]
    Barrier(#[from] BarrierError),

    /// A packet source reported a failure
    #[error("Source '{name}' failed: {reason}")]
    Source { name: String, reason: String },

    /// A packet sink reported a failure
    #[error("Sink '{name}' failed: {reason}")]
    Sink { name: String, reason: String },

    /// The OS refused to create the worker thread
    #[error("Failed to spawn thread for task '{name}': {reason}")]
    Spawn { name: String, reason: String },

    /// The worker thread panicked
    #[error("Task '{0}' panicked")]
    Panicked(String),

    /// Operation not valid in the pipeline's current state
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result type for task operations
pub type TaskResult<T> = Result<T, TaskError>;
