//! Lockbox descriptions loaded from TOML.
//!
//! ```toml
//! [[joints]]
//! min_limit = 0.0
//! max_limit = 180.0
//! coordinates = [0.0, 0.0, 0.0]
//!
//! [[joints]]
//! min_limit = 0.0
//! max_limit = 90.0
//! position = 10.0
//! unlock = [{ master = 0, min = 150.0, max = 180.0 }]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::LearnerError;
use crate::simulation::mechanism::{Joint, LockRule, Lockbox, UnlockWindow};

/// One joint of a lockbox file.
#[derive(Debug, Clone, Deserialize)]
pub struct JointSpec {
    pub min_limit: f64,
    pub max_limit: f64,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub coordinates: Option<[f64; 3]>,
    #[serde(default)]
    pub unlock: Vec<UnlockWindow>,
}

/// A complete lockbox file.
#[derive(Debug, Clone, Deserialize)]
pub struct LockboxSpec {
    pub joints: Vec<JointSpec>,
}

impl LockboxSpec {
    /// Parses a lockbox description.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::LockboxSpec`] for malformed TOML.
    pub fn from_toml_str(source: &str) -> Result<Self, LearnerError> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a lockbox file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LearnerError> {
        let source = std::fs::read_to_string(path).map_err(|e| LearnerError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    /// Whether every joint carries 3D coordinates.
    #[must_use]
    pub fn has_coordinates(&self) -> bool {
        self.joints.iter().all(|joint| joint.coordinates.is_some())
    }
}

impl Lockbox {
    /// Builds a simulated lockbox from its description.
    ///
    /// # Errors
    ///
    /// Returns [`LearnerError::InvalidLockbox`] if the rules are malformed.
    pub fn from_spec(spec: &LockboxSpec) -> Result<Self, LearnerError> {
        let joints = spec
            .joints
            .iter()
            .enumerate()
            .map(|(id, joint)| {
                let mut built = Joint::new(id, joint.min_limit, joint.max_limit);
                if let Some(position) = joint.position {
                    let clamped = built.clamp(position);
                    built = built.with_position(clamped);
                }
                if let Some(coordinates) = joint.coordinates {
                    built = built.with_coordinates(coordinates);
                }
                built
            })
            .collect();
        let rules = spec
            .joints
            .iter()
            .map(|joint| LockRule {
                windows: joint.unlock.clone(),
            })
            .collect();
        Self::new(joints, rules)
    }
}
