//! Barrier construction parameters

use serde::{Deserialize, Serialize};

use super::error::{BarrierError, BarrierResult};

/// Smallest ring that can double-buffer
pub const MIN_SLOT_COUNT: usize = 2;

/// Default ring size
///
/// Four slots of 512 frames at 48kHz give ~42ms of slack between stages.
pub const DEFAULT_SLOT_COUNT: usize = 4;

/// What the producer does when every slot is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverrunPolicy {
    /// Refuse the new packet and hand it back to the caller
    #[default]
    DropIncoming,
    /// Replace the oldest unread packet and hand the old one back
    ///
    /// Keeps latency bounded at the cost of losing stale audio.
    OverwriteOldest,
}

/// Barrier configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarrierConfig {
    /// Number of slots in the ring (at least 2)
    pub slot_count: usize,
    /// Behaviour on a full ring
    pub overrun_policy: OverrunPolicy,
    /// Number of consumer handles to create (at least 1)
    pub consumer_count: usize,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            overrun_policy: OverrunPolicy::default(),
            consumer_count: 1,
        }
    }
}

impl BarrierConfig {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: OverrunPolicy) -> Self {
        self.overrun_policy = policy;
        self
    }

    pub fn with_consumers(mut self, consumer_count: usize) -> Self {
        self.consumer_count = consumer_count;
        self
    }

    /// Reject configurations the ring cannot honour
    pub fn validate(&self) -> BarrierResult<()> {
        if self.slot_count < MIN_SLOT_COUNT {
            return Err(BarrierError::TooFewSlots(self.slot_count));
        }
        if self.consumer_count == 0 {
            return Err(BarrierError::NoConsumers);
        }
        Ok(())
    }

    /// Pool size paired with this ring
    pub fn pool_capacity(&self) -> usize {
        self.slot_count.saturating_mul(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(BarrierConfig::default().validate().is_ok());
        assert_eq!(
            BarrierConfig::new(1).validate(),
            Err(BarrierError::TooFewSlots(1))
        );
        assert_eq!(
            BarrierConfig::new(4).with_consumers(0).validate(),
            Err(BarrierError::NoConsumers)
        );
    }

    #[test]
    fn test_pool_capacity_saturates() {
        assert_eq!(BarrierConfig::new(4).pool_capacity(), 8);
        assert_eq!(BarrierConfig::new(usize::MAX).pool_capacity(), usize::MAX);
    }

    #[test]
    fn test_yaml_defaults() {
        let config: BarrierConfig =
            serde_yaml::from_str("overrun_policy: overwrite-oldest\n").unwrap();
        assert_eq!(config.slot_count, DEFAULT_SLOT_COUNT);
        assert_eq!(config.overrun_policy, OverrunPolicy::OverwriteOldest);
        assert_eq!(config.consumer_count, 1);
    }
}
