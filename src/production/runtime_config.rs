//! Runtime-adjustable drain and backpressure knobs

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Reuse rate, reuse threshold and capacity, always replaced as a unit.
///
/// Invariants:
/// - `sample_reuse_rate` in [0, 1)
/// - `sample_reuse_threshold` in [0, 1)
/// - `capacity` > 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on the fraction of the drain pool evicted per cycle
    pub sample_reuse_rate: f64,
    /// Target fraction of freshly drained items within the pool
    pub sample_reuse_threshold: f64,
    /// Buffer size at which parameter requests are refused
    pub capacity: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            sample_reuse_rate: 0.0,
            sample_reuse_threshold: 0.0,
            capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    pub fn new(sample_reuse_rate: f64, sample_reuse_threshold: f64, capacity: u64) -> Self {
        RuntimeConfig {
            sample_reuse_rate,
            sample_reuse_threshold,
            capacity,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.sample_reuse_rate) {
            return Err(ConfigError::invalid(format!(
                "sample_reuse_rate must be in [0, 1), got {}",
                self.sample_reuse_rate
            )));
        }
        if !(0.0..1.0).contains(&self.sample_reuse_threshold) {
            return Err(ConfigError::invalid(format!(
                "sample_reuse_threshold must be in [0, 1), got {}",
                self.sample_reuse_threshold
            )));
        }
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(RuntimeConfig::new(1.0, 0.5, 10).validate().is_err());
        assert!(RuntimeConfig::new(-0.1, 0.5, 10).validate().is_err());
        assert!(RuntimeConfig::new(0.5, 1.0, 10).validate().is_err());
        assert!(RuntimeConfig::new(0.5, 0.5, 0).validate().is_err());
        assert!(RuntimeConfig::new(f64::NAN, 0.5, 10).validate().is_err());
    }

    #[test]
    fn test_accepts_boundaries() {
        assert!(RuntimeConfig::new(0.0, 0.0, 1).validate().is_ok());
        assert!(RuntimeConfig::new(0.999, 0.999, u64::MAX).validate().is_ok());
    }
}
