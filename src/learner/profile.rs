//! Stand-alone changepoint profiles.
//!
//! A profile is the outcome of one calibration sweep: per-degree changepoint
//! probabilities and the same-segment vectors derived from them, saved as
//! `cp_profile_<date>.json` without running the learner.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LearnerError;
use crate::inference::changepoint::ChangepointDetector;
use crate::inference::segments::{SegmentEstimate, SegmentEstimator};
use crate::learner::snapshot::{read_json, write_json_atomic};
use crate::simulation::executor::ActionExecutor;
use crate::simulation::mechanism::Mechanism;

/// Drives every joint to its upper and then its lower limit, leaving the
/// other joints where they are.
///
/// # Errors
///
/// Propagates executor failures.
pub fn calibration_sweep<E: ActionExecutor>(executor: &mut E) -> Result<(), LearnerError> {
    let joint_count = executor.mechanism().joint_count();
    for joint in 0..joint_count {
        let limits = &executor.mechanism().joints()[joint];
        let (min, max) = (limits.min_limit, limits.max_limit);
        for bound in [max, min] {
            let mut target = executor.mechanism().positions();
            target[joint] = bound;
            let unlocked = executor.run_action(&target, joint)?;
            debug!(joint, bound, unlocked, "calibration move");
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangepointProfile {
    pub date: DateTime<Utc>,
    /// Per-degree changepoint probabilities, one vector per joint.
    pub changepoint_probabilities: Vec<Vec<f64>>,
    /// Per-degree same-segment probabilities, one vector per joint.
    pub same_segment: Vec<Vec<f64>>,
}

impl ChangepointProfile {
    /// Sweeps every joint with recording on and estimates the profile.
    ///
    /// # Errors
    ///
    /// Propagates executor failures from the sweep.
    pub fn record<E: ActionExecutor>(
        executor: &mut E,
        detector: &dyn ChangepointDetector,
    ) -> Result<Self, LearnerError> {
        executor.set_recording(true);
        calibration_sweep(executor)?;
        let estimate = SegmentEstimator::new(Some(detector), executor.recording_mode())
            .estimate(executor.motion_record(), executor.mechanism().joint_count());
        Ok(Self::from_estimate(Utc::now(), &estimate))
    }

    #[must_use]
    pub fn from_estimate(date: DateTime<Utc>, estimate: &SegmentEstimate) -> Self {
        Self {
            date,
            changepoint_probabilities: estimate.changepoints.clone(),
            same_segment: estimate
                .same_segment
                .iter()
                .map(|s| s.probabilities().to_vec())
                .collect(),
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("cp_profile_{}.json", self.date.format("%Y-%m-%d-%H-%M-%S"))
    }

    /// Writes the profile into `dir` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::Io`] or [`LearnerError::Serialization`] when
    /// the write fails.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, LearnerError> {
        let path = dir.join(self.file_name());
        write_json_atomic(&path, self)?;
        info!(path = %path.display(), "changepoint profile written");
        Ok(path)
    }

    /// # Errors
    ///
    /// Returns [`LearnerError::Io`] if the file cannot be read and
    /// [`LearnerError::Serialization`] if it is not a profile.
    pub fn load(path: &Path) -> Result<Self, LearnerError> {
        read_json(path)
    }
}
