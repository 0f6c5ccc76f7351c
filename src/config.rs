//! Learner configuration.
//!
//! Tunable per-run settings live here; fixed hyperparameters are constants
//! in [`crate::simulation::params`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LearnerError;
use crate::inference::posterior::AlphaPrior;
use crate::inference::prior::DistanceMetric;
use crate::planning::objective::ObjectiveKind;
use crate::planning::sampling::SamplingStrategy;
use crate::simulation::params::{DEFAULT_QUERIES, DEFAULT_RUNS, DEFAULT_SAMPLES, INDEPENDENT_PRIOR};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Iteration budget per run.
    pub queries: usize,
    /// Candidate actions requested from the sampler each iteration.
    pub samples: usize,
    pub runs: usize,
    pub threads: usize,
    pub objective: ObjectiveKind,
    pub sampler: SamplingStrategy,
    /// Estimate same-segment probabilities from a calibration sweep.
    pub use_changepoints: bool,
    /// Measure joint distance in 3D when coordinates are available.
    pub use_3d_positions: bool,
    pub alpha_prior: AlphaPrior,
    pub independent_prior: f64,
    /// Base seed; run `k` uses `seed + k`. Drawn from entropy when absent.
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            queries: DEFAULT_QUERIES,
            samples: DEFAULT_SAMPLES,
            runs: DEFAULT_RUNS,
            threads: std::thread::available_parallelism().map_or(1, usize::from),
            objective: ObjectiveKind::default(),
            sampler: SamplingStrategy::default(),
            use_changepoints: false,
            use_3d_positions: false,
            alpha_prior: AlphaPrior::default(),
            independent_prior: INDEPENDENT_PRIOR,
            seed: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl LearnerConfig {
    /// Rejects settings no run could start with.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::InvalidConfig`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), LearnerError> {
        let invalid = |reason: &str| {
            Err(LearnerError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };
        if self.samples == 0 {
            return invalid("samples must be positive");
        }
        if self.runs == 0 {
            return invalid("runs must be positive");
        }
        if self.threads == 0 {
            return invalid("threads must be positive");
        }
        if !(self.independent_prior > 0.0 && self.independent_prior < 1.0) {
            return invalid("independent prior must lie strictly between 0 and 1");
        }
        if !(self.alpha_prior.locked > 0.0 && self.alpha_prior.unlocked > 0.0) {
            return invalid("alpha prior pseudo-counts must be positive");
        }
        Ok(())
    }

    #[must_use]
    pub const fn distance_metric(&self) -> DistanceMetric {
        DistanceMetric::from_3d_flag(self.use_3d_positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LearnerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queries, 20);
        assert_eq!(config.samples, 4000);
        assert_eq!(config.sampler, SamplingStrategy::SingleJointMove);
    }

    #[test]
    fn test_rejects_degenerate_independent_prior() {
        let config = LearnerConfig {
            independent_prior: 1.0,
            ..LearnerConfig::default()
        };
        assert!(matches!(config.validate(), Err(LearnerError::InvalidConfig { .. })));
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: LearnerConfig =
            serde_json::from_str(r#"{"objective": "random", "queries": 5}"#).unwrap();
        assert_eq!(config.objective, ObjectiveKind::Random);
        assert_eq!(config.queries, 5);
        assert_eq!(config.samples, 4000);
    }
}
