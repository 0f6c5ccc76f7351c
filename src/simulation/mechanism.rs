use crate::error::LearnerError;
use crate::inference::hypothesis::{Dependency, HypothesisSpace};
use crate::simulation::params::{DEGREES, DEMO_MAX_LIMIT, DEMO_MIN_LIMIT, DEMO_UNLOCK_FROM};
use serde::{Deserialize, Serialize};

/// A single revolute joint of the mechanism.
///
/// Positions are in degrees. Limits bound every commanded target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub id: usize,
    pub position: f64,
    pub min_limit: f64,
    pub max_limit: f64,
    pub coordinates: Option<[f64; 3]>,
}

impl Joint {
    /// Creates a joint resting at its lower limit.
    #[must_use]
    pub const fn new(id: usize, min_limit: f64, max_limit: f64) -> Self {
        Self {
            id,
            position: min_limit,
            min_limit,
            max_limit,
            coordinates: None,
        }
    }

    #[must_use]
    pub const fn with_position(mut self, position: f64) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub const fn with_coordinates(mut self, coordinates: [f64; 3]) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Current position truncated to whole degrees, as reported by encoders.
    #[must_use]
    pub fn get_position(&self) -> f64 {
        self.position.floor()
    }

    /// Clamps a target into the joint limits.
    #[must_use]
    pub fn clamp(&self, target: f64) -> f64 {
        target.clamp(self.min_limit, self.max_limit)
    }
}

/// Angular degree bucket of a position (cyclic modulo 360).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn degree_of(position: f64) -> usize {
    (position.round() as i64).rem_euclid(DEGREES as i64) as usize
}

/// Read access to a multi-jointed mechanism.
pub trait Mechanism {
    /// Joints in their fixed order.
    fn joints(&self) -> &[Joint];

    /// Whether a joint currently refuses to move.
    fn is_locked(&self, joint: usize) -> bool;

    /// Ground-truth dependency of every joint. Used for diagnostics only.
    fn ground_truth(&self) -> &[Dependency];

    fn joint_count(&self) -> usize {
        self.joints().len()
    }

    /// Encoder positions of all joints.
    fn positions(&self) -> Vec<f64> {
        self.joints().iter().map(Joint::get_position).collect()
    }

    /// Lock observability of all joints.
    fn locked_states(&self) -> Vec<bool> {
        (0..self.joint_count()).map(|i| self.is_locked(i)).collect()
    }

    /// One-hot ground-truth rows over the hypothesis layout.
    fn ground_truth_matrix(&self) -> Vec<Vec<f64>> {
        let space = HypothesisSpace::new(self.joint_count());
        self.ground_truth()
            .iter()
            .map(|&dependency| space.one_hot(dependency))
            .collect()
    }
}

/// Interval in which a master joint must sit for its slave to be free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockWindow {
    pub master: usize,
    pub min: f64,
    pub max: f64,
}

impl UnlockWindow {
    #[must_use]
    pub const fn new(master: usize, min: f64, max: f64) -> Self {
        Self { master, min, max }
    }

    #[must_use]
    pub fn contains(&self, position: f64) -> bool {
        position >= self.min && position <= self.max
    }
}

/// Locking rule of one joint: it is free iff every window is satisfied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockRule {
    pub windows: Vec<UnlockWindow>,
}

impl LockRule {
    #[must_use]
    pub const fn independent() -> Self {
        Self {
            windows: Vec::new(),
        }
    }

    #[must_use]
    pub fn gated_by(master: usize, min: f64, max: f64) -> Self {
        Self {
            windows: vec![UnlockWindow::new(master, min, max)],
        }
    }

    #[must_use]
    pub fn gated_by_pair(first: UnlockWindow, second: UnlockWindow) -> Self {
        Self {
            windows: vec![first, second],
        }
    }

    /// Dependency hypothesis this rule realises.
    #[must_use]
    pub fn dependency(&self) -> Dependency {
        match self.windows.as_slice() {
            [] => Dependency::Independent,
            [only] => Dependency::Single(only.master),
            [a, b, ..] => Dependency::pair(a.master, b.master),
        }
    }

    fn is_satisfied(&self, joints: &[Joint]) -> bool {
        self.windows
            .iter()
            .all(|window| window.contains(joints[window.master].get_position()))
    }
}

/// Simulated lockbox: joints whose freedom is gated by other joints.
#[derive(Debug, Clone)]
pub struct Lockbox {
    joints: Vec<Joint>,
    rules: Vec<LockRule>,
    ground_truth: Vec<Dependency>,
}

impl Lockbox {
    /// Creates a lockbox, validating that every rule refers to other,
    /// existing joints and names at most two masters.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::InvalidLockbox`] for malformed rules or limits.
    pub fn new(joints: Vec<Joint>, rules: Vec<LockRule>) -> Result<Self, LearnerError> {
        if joints.is_empty() {
            return Err(LearnerError::InvalidLockbox {
                reason: "a lockbox needs at least one joint".into(),
            });
        }
        if joints.len() != rules.len() {
            return Err(LearnerError::InvalidLockbox {
                reason: format!("{} joints but {} lock rules", joints.len(), rules.len()),
            });
        }
        for (i, (joint, rule)) in joints.iter().zip(&rules).enumerate() {
            if joint.min_limit > joint.max_limit || !joint.min_limit.is_finite() {
                return Err(LearnerError::InvalidLockbox {
                    reason: format!("joint {i} has invalid limits"),
                });
            }
            if rule.windows.len() > 2 {
                return Err(LearnerError::InvalidLockbox {
                    reason: format!("joint {i} is gated by more than two joints"),
                });
            }
            if let Some(window) = rule
                .windows
                .iter()
                .find(|w| w.master == i || w.master >= joints.len())
            {
                return Err(LearnerError::InvalidLockbox {
                    reason: format!("joint {i} cannot be gated by joint {}", window.master),
                });
            }
        }
        let ground_truth = rules.iter().map(LockRule::dependency).collect();
        let joints = joints
            .into_iter()
            .enumerate()
            .map(|(id, joint)| Joint { id, ..joint })
            .collect();
        Ok(Self {
            joints,
            rules,
            ground_truth,
        })
    }

    /// A linear chain where joint `i + 1` opens only once joint `i` sits near
    /// its upper limit. Joint 0 is independent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn demo(joint_count: usize) -> Self {
        let joints = (0..joint_count.max(1))
            .map(|i| {
                Joint::new(i, DEMO_MIN_LIMIT, DEMO_MAX_LIMIT).with_coordinates([i as f64, 0.0, 0.0])
            })
            .collect();
        let rules: Vec<LockRule> = (0..joint_count.max(1))
            .map(|i| {
                if i == 0 {
                    LockRule::independent()
                } else {
                    LockRule::gated_by(i - 1, DEMO_UNLOCK_FROM, DEMO_MAX_LIMIT)
                }
            })
            .collect();
        let ground_truth = rules.iter().map(LockRule::dependency).collect();
        Self {
            joints,
            rules,
            ground_truth,
        }
    }

    /// Moves a joint without any lock check. Used by the controller.
    pub(crate) fn set_position(&mut self, joint: usize, position: f64) {
        let joint = &mut self.joints[joint];
        joint.position = joint.clamp(position);
    }
}

impl Mechanism for Lockbox {
    fn joints(&self) -> &[Joint] {
        &self.joints
    }

    fn is_locked(&self, joint: usize) -> bool {
        !self.rules[joint].is_satisfied(&self.joints)
    }

    fn ground_truth(&self) -> &[Dependency] {
        &self.ground_truth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_wraps() {
        assert_eq!(degree_of(0.0), 0);
        assert_eq!(degree_of(359.6), 0);
        assert_eq!(degree_of(-1.0), 359);
        assert_eq!(degree_of(725.0), 5);
    }

    #[test]
    fn test_demo_chain_locks() {
        let lockbox = Lockbox::demo(3);
        assert!(!lockbox.is_locked(0));
        assert!(lockbox.is_locked(1));
        assert!(lockbox.is_locked(2));
        assert_eq!(
            lockbox.ground_truth(),
            &[Dependency::Independent, Dependency::Single(0), Dependency::Single(1)]
        );
    }

    #[test]
    fn test_moving_master_unlocks_slave() {
        let mut lockbox = Lockbox::demo(2);
        lockbox.set_position(0, 170.0);
        assert!(!lockbox.is_locked(1));
    }

    #[test]
    fn test_set_position_respects_limits() {
        let mut lockbox = Lockbox::demo(1);
        lockbox.set_position(0, 500.0);
        assert_eq!(lockbox.joints()[0].position, DEMO_MAX_LIMIT);
    }

    #[test]
    fn test_self_gating_is_rejected() {
        let joints = vec![Joint::new(0, 0.0, 90.0), Joint::new(1, 0.0, 90.0)];
        let rules = vec![LockRule::gated_by(0, 0.0, 10.0), LockRule::independent()];
        assert!(matches!(
            Lockbox::new(joints, rules),
            Err(LearnerError::InvalidLockbox { .. })
        ));
    }

    #[test]
    fn test_ground_truth_matrix_is_one_hot() {
        let lockbox = Lockbox::demo(3);
        for row in lockbox.ground_truth_matrix() {
            assert_eq!(row.len(), 7);
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }
}
