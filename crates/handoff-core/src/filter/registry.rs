//! Filter registry - create filters by name
//!
//! Factories are registered under a unique name together with the
//! [`FilterKind`] they produce, so callers can list e.g. every
//! frequency transform without instantiating anything.

use std::collections::BTreeMap;

use super::native::{ChannelMap, Gain, NearestResampler, Passthrough};
use super::{Filter, FilterChain, FilterError, FilterKind, FilterParams, FilterResult, FilterSpec};

/// Builds a filter from its parameters
pub type FilterFactory =
    Box<dyn Fn(&FilterParams) -> FilterResult<Box<dyn Filter>> + Send + Sync>;

struct Registration {
    kind: FilterKind,
    factory: FilterFactory,
}

#[derive(Default)]
pub struct FilterRegistry {
    entries: BTreeMap<String, Registration>,
}

impl FilterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the native filters
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();

        registry.register(Passthrough::NAME, FilterKind::Unknown, |_| {
            Ok(Box::new(Passthrough::new()))
        });
        registry.register(Gain::NAME, FilterKind::Effects, |params| {
            let gain = params.require(Gain::NAME, "gain")?;
            Ok(Box::new(Gain::new(gain)?))
        });
        registry.register(
            NearestResampler::NAME,
            FilterKind::FrequencyTransform,
            |params| {
                let value = params.require(NearestResampler::NAME, "sample_rate")?;
                let rate = integer_param(NearestResampler::NAME, "sample_rate", value, u32::MAX.into())?;
                Ok(Box::new(NearestResampler::new(rate as u32)?))
            },
        );
        registry.register(ChannelMap::NAME, FilterKind::ChannelTransform, |params| {
            let value = params.require(ChannelMap::NAME, "channels")?;
            let channels = integer_param(ChannelMap::NAME, "channels", value, u16::MAX.into())?;
            Ok(Box::new(ChannelMap::new(channels as u16)?))
        });

        registry
    }

    /// Register a factory; returns true if it replaced an existing entry
    pub fn register<F>(&mut self, name: impl Into<String>, kind: FilterKind, factory: F) -> bool
    where
        F: Fn(&FilterParams) -> FilterResult<Box<dyn Filter>> + Send + Sync + 'static,
    {
        self.entries
            .insert(
                name.into(),
                Registration {
                    kind,
                    factory: Box::new(factory),
                },
            )
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn kind_of(&self, name: &str) -> Option<FilterKind> {
        self.entries.get(name).map(|r| r.kind)
    }

    /// Registered names producing filters of `kind`
    pub fn filters_of_kind(&self, kind: FilterKind) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn create(&self, spec: &FilterSpec) -> FilterResult<Box<dyn Filter>> {
        let registration = self
            .entries
            .get(&spec.name)
            .ok_or_else(|| FilterError::UnknownFilter(spec.name.clone()))?;
        (registration.factory)(&spec.params)
    }

    /// Instantiate every spec in order as one chain
    pub fn build_chain(&self, specs: &[FilterSpec]) -> FilterResult<FilterChain> {
        let mut chain = FilterChain::new();
        for spec in specs {
            chain.push(self.create(spec)?);
        }
        Ok(chain)
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, r)| (name, r.kind)))
            .finish()
    }
}

/// Validate a whole-number parameter in `1..=max`
fn integer_param(filter: &str, param: &str, value: f64, max: f64) -> FilterResult<f64> {
    if value < 1.0 || value > max || value.fract() != 0.0 {
        return Err(FilterError::InvalidParam {
            filter: filter.to_string(),
            param: param.to_string(),
            value,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::AudioFormat;

    #[test]
    fn test_builtin_names() {
        let registry = FilterRegistry::with_builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["channel-map", "gain", "passthrough", "resample"]);
        assert_eq!(
            registry.filters_of_kind(FilterKind::FrequencyTransform),
            vec!["resample"]
        );
        assert_eq!(registry.kind_of("gain"), Some(FilterKind::Effects));
    }

    #[test]
    fn test_create_with_params() {
        let registry = FilterRegistry::with_builtin();
        let filter = registry
            .create(&FilterSpec::new("resample").with_param("sample_rate", 44100.0))
            .unwrap();
        let input = AudioFormat::pcm_i16(2, 48000).unwrap();
        assert_eq!(filter.output_format(&input).unwrap().sample_rate(), 44100);
    }

    #[test]
    fn test_create_errors() {
        let registry = FilterRegistry::with_builtin();
        assert!(matches!(
            registry.create(&FilterSpec::new("reverb")),
            Err(FilterError::UnknownFilter(name)) if name == "reverb"
        ));
        assert!(matches!(
            registry.create(&FilterSpec::new("gain")),
            Err(FilterError::MissingParam { .. })
        ));
        assert!(matches!(
            registry.create(&FilterSpec::new("channel-map").with_param("channels", 1.5)),
            Err(FilterError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = FilterRegistry::new();
        assert!(!registry.register("copy", FilterKind::Unknown, |_| {
            Ok(Box::new(Passthrough::new()))
        }));
        assert!(registry.register("copy", FilterKind::Effects, |_| {
            Ok(Box::new(Passthrough::new()))
        }));
        assert_eq!(registry.kind_of("copy"), Some(FilterKind::Effects));
    }

    #[test]
    fn test_build_chain() {
        let registry = FilterRegistry::with_builtin();
        let chain = registry
            .build_chain(&[
                FilterSpec::new("gain").with_param("gain", 0.5),
                FilterSpec::new("channel-map").with_param("channels", 1.0),
            ])
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.info().kind, FilterKind::ChannelTransform);
    }
}
