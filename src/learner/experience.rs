//! Per-joint experience and the success/failure streaks fed to objectives.

use serde::{Deserialize, Serialize};

/// A query of one joint: the configuration after the action and whether the
/// joint was observed locked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub configuration: Vec<f64>,
    pub observed_locked: bool,
}

/// Joints that were recently unlocked or failed to unlock.
///
/// A success clears the failure streak. Successes accumulate for the whole
/// run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Streaks {
    successes: Vec<usize>,
    failures: Vec<usize>,
}

impl Streaks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of probing `joint`.
    pub fn record(&mut self, joint: usize, unlocked: bool) {
        if unlocked {
            self.failures.clear();
            self.successes.push(joint);
        } else {
            self.failures.push(joint);
        }
    }

    #[must_use]
    pub fn successes(&self) -> &[usize] {
        &self.successes
    }

    #[must_use]
    pub fn failures(&self) -> &[usize] {
        &self.failures
    }

    #[must_use]
    pub fn last_success(&self) -> Option<usize> {
        self.successes.last().copied()
    }
}
