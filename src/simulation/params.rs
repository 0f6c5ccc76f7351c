//! Learner and simulation hyperparameters.

/// Angular resolution of same-segment and changepoint vectors.
pub const DEGREES: usize = 360;

// Priors
pub const INDEPENDENT_PRIOR: f64 = 0.7;
pub const ALPHA_PRIOR_LOCKED: f64 = 0.1;
pub const ALPHA_PRIOR_UNLOCKED: f64 = 0.1;
pub const PAIR_PRIOR_WEIGHT: f64 = 0.1;
/// Coincident joints are treated as this far apart.
pub const MIN_JOINT_DISTANCE: f64 = 0.01;

// Segment probabilities
pub const DEFAULT_CHANGEPOINT_PROBABILITY: f64 = 0.1;
pub const CHANGEPOINT_FLOOR: f64 = 1e-7;
pub const DEVIATION_SCALE: f64 = 0.1;
pub const CHANGEPOINT_HAZARD: f64 = 1.0 / 100.0;
pub const CHANGEPOINT_LAG: usize = 3;
pub const MAX_RUN_LENGTH: usize = 400;

// Posterior
pub const PROBABILITY_FLOOR: f64 = 1e-12;

// Action selection
pub const NOOP_TOLERANCE: f64 = 0.1;
pub const BOUNDARY_TOLERANCE: f64 = 0.9;

// Simulated controller
pub const CONTROL_GAIN: f64 = 0.5;
pub const MAX_JOINT_SPEED: f64 = 5.0; // Degrees per tick
pub const SETTLE_TOLERANCE: f64 = 0.05;
pub const MAX_CONTROL_TICKS: usize = 2_000;
pub const STALL_TICKS: usize = 3;

// Demo lockbox
pub const DEMO_MIN_LIMIT: f64 = 0.0;
pub const DEMO_MAX_LIMIT: f64 = 180.0;
pub const DEMO_UNLOCK_FROM: f64 = 150.0;

// Run budgets
pub const DEFAULT_QUERIES: usize = 20;
pub const DEFAULT_SAMPLES: usize = 4_000;
pub const DEFAULT_RUNS: usize = 20;
pub const DEFAULT_DEMO_JOINTS: usize = 5;
