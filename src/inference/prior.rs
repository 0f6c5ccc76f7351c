//! Prior over dependency hypotheses.
//!
//! Joints close to each other are more likely to gate one another, so single
//! hypotheses are weighted by inverse distance. Pair hypotheses get a flat
//! weight and independence a fixed mass.

use serde::{Deserialize, Serialize};

use crate::error::LearnerError;
use crate::inference::hypothesis::HypothesisSpace;
use crate::inference::posterior::entropy;
use crate::simulation::mechanism::Joint;
use crate::simulation::params::{MIN_JOINT_DISTANCE, PAIR_PRIOR_WEIGHT};

/// How distances between joints are measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Joints sit along one axis in index order.
    #[default]
    Sequential,
    /// Euclidean distance between joint coordinates.
    Euclidean,
}

impl DistanceMetric {
    #[must_use]
    pub const fn from_3d_flag(use_3d_positions: bool) -> Self {
        if use_3d_positions {
            Self::Euclidean
        } else {
            Self::Sequential
        }
    }
}

/// Distance between two joints.
///
/// Joints without coordinates fall back to the sequential metric.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn joint_distance(joints: &[Joint], a: usize, b: usize, metric: DistanceMetric) -> f64 {
    let sequential = (a as f64 - b as f64).abs();
    match metric {
        DistanceMetric::Sequential => sequential,
        DistanceMetric::Euclidean => match (joints[a].coordinates, joints[b].coordinates) {
            (Some(p), Some(q)) => p
                .iter()
                .zip(q.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            _ => sequential,
        },
    }
}

/// Per-joint prior over the hypothesis space. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyPrior {
    space: HypothesisSpace,
    independent_prior: f64,
    rows: Vec<Vec<f64>>,
}

impl DependencyPrior {
    /// Builds the prior for a mechanism.
    ///
    /// Coincident joints are treated as `MIN_JOINT_DISTANCE` apart so the
    /// weight stays finite. A single-joint mechanism has no dependency
    /// hypothesis left and puts its whole mass on independence.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::InvalidConfig`] if `independent_prior` is
    /// outside (0, 1).
    pub fn build(
        joints: &[Joint],
        independent_prior: f64,
        metric: DistanceMetric,
    ) -> Result<Self, LearnerError> {
        if !(independent_prior > 0.0 && independent_prior < 1.0) {
            return Err(LearnerError::InvalidConfig {
                reason: format!("independent prior {independent_prior} must lie in (0, 1)"),
            });
        }

        let space = HypothesisSpace::new(joints.len());
        let independent = space.independent_index();
        let rows = (0..joints.len())
            .map(|i| {
                let mut row = vec![0.0; space.len()];
                for (j, weight) in row.iter_mut().enumerate().take(joints.len()) {
                    if j != i {
                        let distance = joint_distance(joints, i, j, metric).max(MIN_JOINT_DISTANCE);
                        *weight = 1.0 / distance;
                    }
                }
                for weight in &mut row[joints.len()..independent] {
                    *weight = PAIR_PRIOR_WEIGHT;
                }

                let dependent_mass: f64 = row[..independent].iter().sum();
                if dependent_mass > 0.0 {
                    let scale = (1.0 - independent_prior) / dependent_mass;
                    for weight in &mut row[..independent] {
                        *weight *= scale;
                    }
                    row[independent] = independent_prior;
                } else {
                    row[independent] = 1.0;
                }
                row
            })
            .collect();

        Ok(Self {
            space,
            independent_prior,
            rows,
        })
    }

    #[must_use]
    pub const fn space(&self) -> HypothesisSpace {
        self.space
    }

    #[must_use]
    pub const fn independent_prior(&self) -> f64 {
        self.independent_prior
    }

    #[must_use]
    pub fn row(&self, joint: usize) -> &[f64] {
        &self.rows[joint]
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Shannon entropy of every row.
    #[must_use]
    pub fn entropies(&self) -> Vec<f64> {
        self.rows.iter().map(|row| entropy(row)).collect()
    }
}
