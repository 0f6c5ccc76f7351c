pub mod executor;
pub mod mechanism;
pub mod params;
pub mod spec_file;

pub use executor::{ActionExecutor, SimulatedExecutor};
pub use mechanism::{Lockbox, Mechanism};
