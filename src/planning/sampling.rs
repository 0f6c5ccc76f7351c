//! Candidate action generation.
//!
//! Samplers never propose moving a joint already known to be locked, except
//! the boundary sampler, which enumerates every limit of every joint.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LearnerError;
use crate::simulation::mechanism::{Joint, Mechanism};
use crate::simulation::params::BOUNDARY_TOLERANCE;

/// Move `joint` so the mechanism reaches `target`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateAction {
    pub joint: usize,
    pub target: Vec<f64>,
}

/// Produces a finite set of candidate actions for one iteration.
pub trait ActionSampler {
    /// `locked_states[j]` is `Some(true)` when joint `j` is known locked and
    /// `None` before it has been observed.
    fn sample(
        &mut self,
        samples: usize,
        mechanism: &dyn Mechanism,
        locked_states: &[Option<bool>],
        rng: &mut StdRng,
    ) -> Vec<CandidateAction>;

    fn name(&self) -> &str;
}

/// Built-in sampling strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Every joint to each of its limits.
    Boundary,
    /// Random targets for every joint not known to be locked.
    RandomConfiguration,
    /// One randomly chosen free joint to a random target.
    #[default]
    SingleJointMove,
}

impl SamplingStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boundary => "boundary",
            Self::RandomConfiguration => "random_configuration",
            Self::SingleJointMove => "single_joint_move",
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingStrategy {
    type Err = LearnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boundary" | "small" => Ok(Self::Boundary),
            "random_configuration" => Ok(Self::RandomConfiguration),
            "single_joint_move" | "large" => Ok(Self::SingleJointMove),
            other => Err(LearnerError::UnknownSampler(other.to_owned())),
        }
    }
}

fn is_known_locked(locked_states: &[Option<bool>], joint: usize) -> bool {
    locked_states.get(joint).copied().flatten() == Some(true)
}

/// Uniform whole-degree target in `[min, max)`, or `min` for a degenerate range.
#[allow(clippy::cast_possible_truncation)]
fn random_target(joint: &Joint, rng: &mut StdRng) -> f64 {
    let min = joint.min_limit.ceil() as i64;
    let max = joint.max_limit.floor() as i64;
    if max > min {
        #[allow(clippy::cast_precision_loss)]
        let target = rng.random_range(min..max) as f64;
        target
    } else {
        joint.min_limit
    }
}

/// Proposes each limit of each joint, skipping limits the joint already sits
/// at.
#[must_use]
pub fn boundary_sampling(mechanism: &dyn Mechanism) -> Vec<CandidateAction> {
    let current = mechanism.positions();
    let mut actions = Vec::new();
    for (j, joint) in mechanism.joints().iter().enumerate() {
        for limit in [joint.min_limit, joint.max_limit] {
            if (current[j] - limit).abs() < BOUNDARY_TOLERANCE {
                continue;
            }
            let mut target = current.clone();
            target[j] = limit;
            actions.push(CandidateAction { joint: j, target });
        }
    }
    actions
}

/// Random configurations holding known-locked joints in place. Each action
/// targets a uniformly chosen joint among the ones that move.
#[must_use]
pub fn random_configuration_sampling(
    samples: usize,
    mechanism: &dyn Mechanism,
    locked_states: &[Option<bool>],
    rng: &mut StdRng,
) -> Vec<CandidateAction> {
    let current = mechanism.positions();
    let movable: Vec<usize> = (0..mechanism.joint_count())
        .filter(|&j| !is_known_locked(locked_states, j))
        .collect();
    if movable.is_empty() {
        return Vec::new();
    }
    (0..samples)
        .filter_map(|_| {
            let mut target = current.clone();
            for &j in &movable {
                target[j] = random_target(&mechanism.joints()[j], rng);
            }
            movable
                .choose(rng)
                .map(|&joint| CandidateAction { joint, target })
        })
        .collect()
}

/// Moves a single random joint not known to be locked.
#[must_use]
pub fn single_joint_move_sampling(
    samples: usize,
    mechanism: &dyn Mechanism,
    locked_states: &[Option<bool>],
    rng: &mut StdRng,
) -> Vec<CandidateAction> {
    let current = mechanism.positions();
    let movable: Vec<usize> = (0..mechanism.joint_count())
        .filter(|&j| !is_known_locked(locked_states, j))
        .collect();
    (0..samples)
        .filter_map(|_| {
            let &joint = movable.choose(rng)?;
            let mut target = current.clone();
            target[joint] = random_target(&mechanism.joints()[joint], rng);
            Some(CandidateAction { joint, target })
        })
        .collect()
}

impl ActionSampler for SamplingStrategy {
    fn sample(
        &mut self,
        samples: usize,
        mechanism: &dyn Mechanism,
        locked_states: &[Option<bool>],
        rng: &mut StdRng,
    ) -> Vec<CandidateAction> {
        match self {
            Self::Boundary => boundary_sampling(mechanism),
            Self::RandomConfiguration => {
                random_configuration_sampling(samples, mechanism, locked_states, rng)
            }
            Self::SingleJointMove => single_joint_move_sampling(samples, mechanism, locked_states, rng),
        }
    }

    fn name(&self) -> &str {
        self.as_str()
    }
}
