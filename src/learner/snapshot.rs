//! Run snapshots and their crash-safe persistence.
//!
//! The snapshot of a run is rewritten in full after every iteration. A write
//! goes to a sibling temporary file that is then renamed over the target, so
//! the file on disk always holds a complete, parseable snapshot.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::LearnerError;
use crate::inference::hypothesis::Dependency;
use crate::inference::posterior::AlphaPrior;
use crate::planning::objective::ObjectiveKind;
use crate::planning::sampling::SamplingStrategy;

/// Everything recorded about one iteration of the loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRow {
    pub iteration: usize,
    pub lock_states_before: Vec<bool>,
    pub positions_before: Vec<f64>,
    pub desired_positions: Vec<f64>,
    pub desired_joint: usize,
    pub checked_joint: usize,
    pub score: f64,
    /// The chosen action would not have moved the targeted joint.
    pub noop: bool,
    pub positions_after: Vec<f64>,
    pub lock_states_after: Vec<bool>,
    pub posteriors: Vec<Vec<f64>>,
    pub entropies: Vec<f64>,
    /// Per joint `KL(ground truth || posterior)`.
    pub kl_divergences: Vec<f64>,
}

/// Run-level settings and derived priors, written once at start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub date: DateTime<Utc>,
    pub run_label: Option<usize>,
    pub seed: u64,
    pub objective: ObjectiveKind,
    pub sampler: SamplingStrategy,
    pub samples: usize,
    pub queries: usize,
    pub changepoint_detection: bool,
    pub use_3d_positions: bool,
    pub alpha_prior: AlphaPrior,
    pub independent_prior: f64,
    pub model_prior: Vec<Vec<f64>>,
    /// Per joint and degree changepoint probability.
    pub changepoint_probabilities: Vec<Vec<f64>>,
    pub same_segment: Vec<Vec<f64>>,
    pub dependency_ground_truth: Vec<Dependency>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub metadata: RunMetadata,
    pub rows: Vec<IterationRow>,
}

impl RunSnapshot {
    #[must_use]
    pub const fn new(metadata: RunMetadata) -> Self {
        Self {
            metadata,
            rows: Vec::new(),
        }
    }
}

/// Owns the snapshot file of one run.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store at `data_<date>_<objective>[_run<k>].json` inside `dir`.
    #[must_use]
    pub fn new(
        dir: &Path,
        date: DateTime<Utc>,
        objective: ObjectiveKind,
        run_label: Option<usize>,
    ) -> Self {
        let mut name = format!("data_{}_{objective}", date.format("%Y-%m-%d-%H-%M-%S"));
        if let Some(run) = run_label {
            name.push_str(&format!("_run{run}"));
        }
        name.push_str(".json");
        Self {
            path: dir.join(name),
        }
    }

    /// Store writing to exactly `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::Io`] if the directory, the temporary file or
    /// the rename fails, and [`LearnerError::Serialization`] if encoding
    /// fails. The previous snapshot is left intact in either case.
    pub fn persist(&self, snapshot: &RunSnapshot) -> Result<(), LearnerError> {
        write_json_atomic(&self.path, snapshot)
    }

    /// Reads a snapshot written by [`SnapshotStore::persist`].
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::Io`] if the file cannot be read and
    /// [`LearnerError::Serialization`] if it is not a snapshot.
    pub fn load(path: &Path) -> Result<RunSnapshot, LearnerError> {
        read_json(path)
    }
}

/// Writes `value` as JSON to a sibling `.tmp` file and renames it over `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), LearnerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LearnerError::io(parent, e))?;
    }
    let encoded = serde_json::to_vec(value)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    let mut file = fs::File::create(&tmp).map_err(|e| LearnerError::io(&tmp, e))?;
    file.write_all(&encoded)
        .and_then(|()| file.sync_all())
        .map_err(|e| LearnerError::io(&tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| LearnerError::io(path, e))
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LearnerError> {
    let bytes = fs::read(path).map_err(|e| LearnerError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
