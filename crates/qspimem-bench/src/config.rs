//! Bench configuration

use serde::{Deserialize, Serialize};

/// How the bench drives the host and ack buses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Seed for the backpressure generator
    pub seed: u64,
    /// Chance per cycle that the host raises `in_valid` for its next byte
    pub in_valid_prob: f64,
    /// Chance per cycle that the host raises `out_ready`
    pub out_ready_prob: f64,
    /// Cycles between seeing an ack request and granting it
    pub grant_latency: u32,
    /// Cycles one bench operation may take before it is declared stalled
    pub max_cycles: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            in_valid_prob: 0.75,
            out_ready_prob: 0.75,
            grant_latency: 2,
            max_cycles: 200_000,
        }
    }
}

impl BenchConfig {
    /// Full-rate host with an immediate grant
    pub fn full_rate() -> Self {
        Self {
            in_valid_prob: 1.0,
            out_ready_prob: 1.0,
            grant_latency: 0,
            ..Default::default()
        }
    }

    /// Check probabilities and budgets
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.in_valid_prob > 0.0 && self.in_valid_prob <= 1.0) {
            return Err("in_valid_prob must be in (0, 1]");
        }
        if !(self.out_ready_prob > 0.0 && self.out_ready_prob <= 1.0) {
            return Err("out_ready_prob must be in (0, 1]");
        }
        if self.max_cycles == 0 {
            return Err("max_cycles must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BenchConfig::default().validate().is_ok());
        assert!(BenchConfig::full_rate().validate().is_ok());
    }

    #[test]
    fn test_zero_probability_rejected() {
        let config = BenchConfig {
            in_valid_prob: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
