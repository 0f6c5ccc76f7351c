//! The active-learning loop and the state it accumulates.

pub mod active;
pub mod experience;
pub mod profile;
pub mod snapshot;

pub use active::{ActiveLearner, RunOutcome, RunStatus};
pub use profile::{calibration_sweep, ChangepointProfile};
