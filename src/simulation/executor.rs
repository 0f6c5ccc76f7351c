//! Actuation of the mechanism.
//!
//! The [`SimulatedExecutor`] drives joints with a saturated proportional
//! controller and records the motion it produces, which later feeds the
//! segment-probability estimator.

use crate::error::LearnerError;
use crate::simulation::mechanism::{Lockbox, Mechanism};
use crate::simulation::params::{
    CONTROL_GAIN, MAX_CONTROL_TICKS, MAX_JOINT_SPEED, NOOP_TOLERANCE, SETTLE_TOLERANCE,
    STALL_TICKS,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How joint velocity reaches the motion record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// Velocity is measured directly.
    #[default]
    Velocity,
    /// Only positions are measured; velocity is their first difference.
    PositionDerivative,
}

/// Motion samples of one joint, one entry per control tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointTrace {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub applied_forces: Vec<f64>,
}

impl JointTrace {
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn push(&mut self, position: f64, velocity: f64, force: f64) {
        self.positions.push(position);
        self.velocities.push(velocity);
        self.applied_forces.push(force);
    }
}

/// Per-run recording of joint motion.
///
/// Owned by the executor of a single run; runs never share a record.
#[derive(Clone, Debug, Default)]
pub struct MotionRecord {
    traces: Vec<JointTrace>,
}

impl MotionRecord {
    #[must_use]
    pub fn new(joint_count: usize) -> Self {
        Self {
            traces: vec![JointTrace::default(); joint_count],
        }
    }

    /// Appends one sample to the trace of a joint.
    pub fn push(&mut self, joint: usize, position: f64, velocity: f64, force: f64) {
        if let Some(trace) = self.traces.get_mut(joint) {
            trace.push(position, velocity, force);
        }
    }

    #[must_use]
    pub fn trace(&self, joint: usize) -> Option<&JointTrace> {
        self.traces.get(joint)
    }

    pub fn clear(&mut self) {
        for trace in &mut self.traces {
            *trace = JointTrace::default();
        }
    }
}

/// Moves a mechanism towards target configurations.
pub trait ActionExecutor {
    type Mechanism: Mechanism;

    fn mechanism(&self) -> &Self::Mechanism;

    /// Drives the mechanism towards `target`.
    ///
    /// Returns `true` iff `joint` was unlocked and free to move. Calling with
    /// a target equal to the current configuration is allowed.
    ///
    /// # Errors
    ///
    /// Fails when the action does not fit the mechanism.
    fn run_action(&mut self, target: &[f64], joint: usize) -> Result<bool, LearnerError>;

    /// Motion recorded so far, if the executor records any.
    fn motion_record(&self) -> Option<&MotionRecord> {
        None
    }

    fn recording_mode(&self) -> RecordingMode {
        RecordingMode::Velocity
    }

    /// Switches motion recording on or off. Switching off drops what was
    /// recorded so far.
    fn set_recording(&mut self, _enabled: bool) {}
}

/// Executor driving a simulated [`Lockbox`].
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    lockbox: Lockbox,
    record: MotionRecord,
    recording: bool,
    velocities: Vec<f64>,
    forces: Vec<f64>,
}

impl SimulatedExecutor {
    #[must_use]
    pub fn new(lockbox: Lockbox) -> Self {
        let joint_count = lockbox.joint_count();
        Self {
            lockbox,
            record: MotionRecord::new(joint_count),
            recording: true,
            velocities: vec![0.0; joint_count],
            forces: vec![0.0; joint_count],
        }
    }

    /// Runs the controller on one joint until it settles or stalls.
    ///
    /// Free motion obeys `v[t] = v[t-1] + f[t-1]`; a blocked joint keeps
    /// zero velocity while force is still applied.
    fn drive_joint(&mut self, joint: usize, target: f64) -> bool {
        let target = self.lockbox.joints()[joint].clamp(target);
        if self.lockbox.is_locked(joint) {
            for _ in 0..STALL_TICKS {
                let position = self.lockbox.joints()[joint].position;
                let force = desired_velocity(target - position) - self.velocities[joint];
                self.sample(joint, 0.0, force);
            }
            self.forces[joint] = 0.0;
            trace!(joint, "joint is locked, stalled");
            return false;
        }

        for _ in 0..MAX_CONTROL_TICKS {
            let position = self.lockbox.joints()[joint].position;
            let error = target - position;
            if error.abs() < SETTLE_TOLERANCE {
                break;
            }
            let velocity = self.velocities[joint] + self.forces[joint];
            self.lockbox.set_position(joint, position + velocity);
            let moved = self.lockbox.joints()[joint].position - position;
            let remaining = target - self.lockbox.joints()[joint].position;
            let force = desired_velocity(remaining) - moved;
            self.sample(joint, moved, force);
        }
        self.lockbox.set_position(joint, target.round());
        self.velocities[joint] = 0.0;
        self.forces[joint] = 0.0;
        true
    }

    fn sample(&mut self, joint: usize, velocity: f64, force: f64) {
        self.velocities[joint] = velocity;
        self.forces[joint] = force;
        if self.recording {
            let position = self.lockbox.joints()[joint].position;
            self.record.push(joint, position, velocity, force);
        }
    }
}

fn desired_velocity(error: f64) -> f64 {
    (CONTROL_GAIN * error).clamp(-MAX_JOINT_SPEED, MAX_JOINT_SPEED)
}

impl ActionExecutor for SimulatedExecutor {
    type Mechanism = Lockbox;

    fn mechanism(&self) -> &Lockbox {
        &self.lockbox
    }

    fn run_action(&mut self, target: &[f64], joint: usize) -> Result<bool, LearnerError> {
        let joint_count = self.lockbox.joint_count();
        if joint >= joint_count {
            return Err(LearnerError::InvalidAction {
                joint,
                reason: format!("mechanism has {joint_count} joints"),
            });
        }
        if target.len() != joint_count {
            return Err(LearnerError::InvalidAction {
                joint,
                reason: format!(
                    "target has {} positions, expected {joint_count}",
                    target.len()
                ),
            });
        }

        // Targeted joint moves last so its report reflects the final layout.
        let order = (0..joint_count)
            .filter(|&j| j != joint)
            .chain(std::iter::once(joint));
        let mut unlocked = !self.lockbox.is_locked(joint);
        for j in order {
            let current = self.lockbox.joints()[j].get_position();
            if (target[j] - current).abs() < NOOP_TOLERANCE {
                if j == joint {
                    unlocked = !self.lockbox.is_locked(joint);
                }
                continue;
            }
            let moved = self.drive_joint(j, target[j]);
            if j == joint {
                unlocked = moved;
            }
        }
        Ok(unlocked)
    }

    fn motion_record(&self) -> Option<&MotionRecord> {
        Some(&self.record)
    }

    fn set_recording(&mut self, enabled: bool) {
        if !enabled {
            self.record.clear();
        }
        self.recording = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::params::{DEMO_MAX_LIMIT, DEMO_UNLOCK_FROM};

    #[test]
    fn test_free_joint_reaches_target() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        let unlocked = executor.run_action(&[90.0, 0.0], 0).unwrap();
        assert!(unlocked);
        assert_eq!(executor.mechanism().positions(), vec![90.0, 0.0]);
    }

    #[test]
    fn test_locked_joint_does_not_move() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        let unlocked = executor.run_action(&[0.0, 90.0], 1).unwrap();
        assert!(!unlocked);
        assert_eq!(executor.mechanism().positions(), vec![0.0, 0.0]);
        assert!(executor.mechanism().is_locked(1));
    }

    #[test]
    fn test_master_moves_before_target() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        let unlocked = executor.run_action(&[DEMO_MAX_LIMIT, 45.0], 1).unwrap();
        assert!(unlocked);
        assert!(!executor.mechanism().is_locked(1));
        assert_eq!(executor.mechanism().positions()[1], 45.0);
        assert!(executor.mechanism().positions()[0] >= DEMO_UNLOCK_FROM);
    }

    #[test]
    fn test_noop_target_is_tolerated() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        assert!(executor.run_action(&[0.0, 0.0], 0).unwrap());
        assert!(!executor.run_action(&[0.0, 0.0], 1).unwrap());
    }

    #[test]
    fn test_motion_is_recorded() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        executor.run_action(&[120.0, 0.0], 0).unwrap();
        let trace = executor.motion_record().unwrap().trace(0).unwrap();
        assert!(trace.len() > 10);
        assert_eq!(trace.positions.len(), trace.velocities.len());
        assert_eq!(trace.positions.len(), trace.applied_forces.len());
        assert!(trace.velocities.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_disabled_recording_drops_and_skips_motion() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        executor.run_action(&[120.0, 0.0], 0).unwrap();
        executor.set_recording(false);
        assert!(executor.motion_record().unwrap().trace(0).unwrap().is_empty());

        executor.run_action(&[30.0, 0.0], 0).unwrap();
        assert!(executor.motion_record().unwrap().trace(0).unwrap().is_empty());
        assert_eq!(executor.mechanism().positions()[0], 30.0);

        executor.set_recording(true);
        executor.run_action(&[90.0, 0.0], 0).unwrap();
        assert!(!executor.motion_record().unwrap().trace(0).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_target_length_is_rejected() {
        let mut executor = SimulatedExecutor::new(Lockbox::demo(2));
        assert!(matches!(
            executor.run_action(&[1.0], 0),
            Err(LearnerError::InvalidAction { .. })
        ));
    }
}
