//! Beliefs about which joints gate which.

pub mod changepoint;
pub mod hypothesis;
pub mod posterior;
pub mod prior;
pub mod segments;

pub use hypothesis::{Dependency, HypothesisSpace};
