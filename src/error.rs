//! Error taxonomy for the learner.
//!
//! Configuration errors are raised before a run starts. A consistency error
//! aborts a run mid-flight; every iteration before it is already on disk.

use std::path::PathBuf;

/// Errors raised while configuring or running the active learner.
#[derive(Debug, thiserror::Error)]
pub enum LearnerError {
    #[error("unknown objective `{0}` (expected random, entropy, cross_entropy or heuristic_proximity)")]
    UnknownObjective(String),

    #[error("unknown action sampling strategy `{0}` (expected single_joint_move, boundary or random_configuration)")]
    UnknownSampler(String),

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid lockbox: {reason}")]
    InvalidLockbox { reason: String },

    #[error("invalid action for joint {joint}: {reason}")]
    InvalidAction { joint: usize, reason: String },

    #[error(
        "consistency check failed for joint {joint}: executor reported unlocked={reported_unlocked} \
         but the mechanism reports locked={observed_locked}"
    )]
    Consistency {
        joint: usize,
        reported_unlocked: bool,
        observed_locked: bool,
    },

    #[error("failed to write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON encoding or decoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to parse lockbox file: {0}")]
    LockboxSpec(#[from] toml::de::Error),
}

impl LearnerError {
    /// Returns true for errors that abort a run after it has started.
    #[must_use]
    pub const fn is_fatal_during_run(&self) -> bool {
        matches!(
            self,
            Self::Consistency { .. } | Self::Io { .. } | Self::Serialization(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
