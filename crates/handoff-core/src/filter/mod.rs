//! Packet filters - format-aware transformations between barriers
//!
//! A filter turns one input packet into one output packet. It either keeps
//! the input format or declares the format it produces through
//! [`Filter::output_format`], so a pipeline can size and tag its barriers
//! before any audio flows.
//!
//! Filters are created by name through the [`FilterRegistry`], which
//! makes them configurable from YAML:
//!
//! ```yaml
//! filters:
//!   - name: resample
//!     params: { sample_rate: 44100 }
//!   - name: gain
//!     params: { gain: 0.5 }
//! ```

mod chain;
mod error;
pub mod native;
mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use chain::FilterChain;
pub use error::{FilterError, FilterResult};
pub use registry::{FilterFactory, FilterRegistry};

use crate::packet::{determine_buffer_size, AudioFormat, AudioPacket};

/// What a filter changes about the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    Unknown,
    /// Changes the sample rate
    FrequencyTransform,
    /// Changes the channel layout
    ChannelTransform,
    /// Alters sample values, format unchanged
    Effects,
    /// Changes both rate and channel layout
    FrequencyAndChannelTransform,
}

impl FilterKind {
    /// Kind of two filters applied one after the other
    pub fn combine(self, other: FilterKind) -> FilterKind {
        use FilterKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Unknown, k) | (k, Unknown) => k,
            (Effects, k) | (k, Effects) => k,
            _ => FrequencyAndChannelTransform,
        }
    }
}

/// Static description of a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInfo {
    /// Registry name (e.g. "resample")
    pub name: String,
    pub kind: FilterKind,
}

impl FilterInfo {
    pub fn new(name: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Numeric filter parameters keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterParams(BTreeMap<String, f64>);

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Value of `key`, or a `MissingParam` error naming `filter`
    pub fn require(&self, filter: &str, key: &str) -> FilterResult<f64> {
        self.get(key).ok_or_else(|| FilterError::MissingParam {
            filter: filter.to_string(),
            param: key.to_string(),
        })
    }
}

/// Configured filter: registry name plus parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_empty_params")]
    pub params: FilterParams,
}

fn is_empty_params(params: &FilterParams) -> bool {
    params.0.is_empty()
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: FilterParams::default(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params = self.params.with(key, value);
        self
    }
}

/// A packet transformation stage
///
/// `transform` runs on a worker thread once per packet and must not block.
/// It writes into a caller-provided output packet so steady-state
/// processing reuses pooled buffers instead of allocating.
pub trait Filter: Send {
    fn info(&self) -> &FilterInfo;

    /// Format produced for a given input format
    fn output_format(&self, input: &AudioFormat) -> FilterResult<AudioFormat>;

    /// Bytes the output packet needs for `input`
    fn output_capacity(&self, input: &AudioPacket) -> FilterResult<usize> {
        match input.format() {
            Some(format) => Ok(determine_buffer_size(input, &self.output_format(&format)?)),
            None => Ok(input.len()),
        }
    }

    /// Transform `input` into `output`, replacing its payload and format
    fn transform(&mut self, input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()>;

    /// Drop any state carried between packets
    fn reset(&mut self) {}
}

/// Replace `output` with a byte copy of `input` (payload and format)
///
/// Fails without touching `output` if it is too small.
pub fn copy_packet(input: &AudioPacket, output: &mut AudioPacket) -> FilterResult<()> {
    if input.len() > output.capacity() {
        return Err(FilterError::OutputTooSmall {
            needed: input.len(),
            capacity: output.capacity(),
        });
    }
    output.clear();
    output.clear_format();
    output.assign(input.as_bytes(), 0)?;
    if let Some(format) = input.format() {
        output.set_format(format)?;
    }
    Ok(())
}

/// Prepare `output` to receive `frames` frames of `format`; returns the byte length
pub(crate) fn prepare_output(
    output: &mut AudioPacket,
    format: AudioFormat,
    frames: usize,
) -> FilterResult<usize> {
    let needed = format.frames_to_bytes(frames);
    if needed > output.capacity() {
        return Err(FilterError::OutputTooSmall {
            needed,
            capacity: output.capacity(),
        });
    }
    output.clear();
    output.set_format(format)?;
    output.set_len(needed)?;
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_combine() {
        use FilterKind::*;
        assert_eq!(Effects.combine(FrequencyTransform), FrequencyTransform);
        assert_eq!(Unknown.combine(ChannelTransform), ChannelTransform);
        assert_eq!(
            FrequencyTransform.combine(ChannelTransform),
            FrequencyAndChannelTransform
        );
        assert_eq!(Effects.combine(Effects), Effects);
    }

    #[test]
    fn test_params() {
        let params = FilterParams::new().with("gain", 0.5);
        assert_eq!(params.get("gain"), Some(0.5));
        assert_eq!(
            params.require("resample", "sample_rate"),
            Err(FilterError::MissingParam {
                filter: "resample".into(),
                param: "sample_rate".into()
            })
        );
    }

    #[test]
    fn test_spec_yaml() {
        let specs: Vec<FilterSpec> = serde_yaml::from_str(
            "- name: gain\n  params: { gain: 0.25 }\n- name: passthrough\n",
        )
        .unwrap();
        assert_eq!(specs[0], FilterSpec::new("gain").with_param("gain", 0.25));
        assert_eq!(specs[1], FilterSpec::new("passthrough"));
    }

    #[test]
    fn test_copy_packet_too_small() {
        let mut input = AudioPacket::with_capacity(8);
        input.assign(&[1; 8], 0).unwrap();
        let mut output = AudioPacket::with_capacity(4);
        output.assign(&[9; 4], 0).unwrap();

        assert!(matches!(
            copy_packet(&input, &mut output),
            Err(FilterError::OutputTooSmall { needed: 8, capacity: 4 })
        ));
        assert_eq!(output.as_bytes(), &[9; 4]);
    }
}
