//! Filter error types

use thiserror::Error;

use crate::packet::{AudioFormat, FormatError, PacketError};

/// Errors raised while building or running a filter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// No factory registered under this name
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// Required parameter missing from the filter spec
    #[error("Filter '{filter}' requires parameter '{param}'")]
    MissingParam { filter: String, param: String },

    /// Parameter present but out of range
    #[error("Filter '{filter}' parameter '{param}' has invalid value {value}")]
    InvalidParam {
        filter: String,
        param: String,
        value: f64,
    },

    /// The filter cannot process this input format
    #[error("Filter '{filter}' does not support input format {format}")]
    UnsupportedFormat { filter: String, format: AudioFormat },

    /// Output packet cannot hold the transformed payload
    #[error("Output packet too small: need {needed} bytes, capacity is {capacity}")]
    OutputTooSmall { needed: usize, capacity: usize },

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;
