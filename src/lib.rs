//! Active learning of joint dependency structures.
//!
//! A learner queries a multi-jointed mechanism, observes which joints are
//! locked, and maintains a posterior over which joint (or pair of joints)
//! gates each of the others.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

pub mod config;
pub mod error;
pub mod inference;
pub mod learner;
pub mod planning;
pub mod simulation;
pub mod ui;

pub use config::LearnerConfig;
pub use error::LearnerError;
