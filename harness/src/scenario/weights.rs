//! Weighted scenario selection

use crate::config::ConfigurationError;

use super::catalogue::Scenario;

/// Allowed deviation of the weight sum from 1
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// A scenario and the cumulative upper bound of its probability range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioWeight {
    pub scenario: Scenario,
    pub upper_bound: f64,
}

/// Cumulative bounds partitioning [0, 1) across scenarios
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    entries: Vec<ScenarioWeight>,
}

impl WeightTable {
    pub fn new(weights: Vec<(Scenario, f64)>) -> Result<Self, ConfigurationError> {
        if weights.is_empty() {
            return Err(ConfigurationError::EmptyWeights);
        }

        let mut cumulative = 0.0;
        let mut entries = Vec::with_capacity(weights.len());
        for (scenario, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigurationError::InvalidWeight {
                    scenario: scenario.name().to_string(),
                    weight,
                });
            }
            cumulative += weight;
            entries.push(ScenarioWeight {
                scenario,
                upper_bound: cumulative,
            });
        }

        if (cumulative - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigurationError::WeightSum { sum: cumulative });
        }
        // Pin the last bound so float drift never leaves a gap below 1
        if let Some(last) = entries.last_mut() {
            last.upper_bound = 1.0;
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScenarioWeight] {
        &self.entries
    }

    /// First scenario whose range contains `draw`, for `draw` in [0, 1)
    pub fn select(&self, draw: f64) -> Scenario {
        let index = self
            .entries
            .partition_point(|entry| entry.upper_bound <= draw)
            .min(self.entries.len() - 1);
        self.entries[index].scenario
    }
}
