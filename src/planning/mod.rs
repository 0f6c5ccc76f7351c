//! Candidate generation and scoring.

pub mod objective;
pub mod sampling;
