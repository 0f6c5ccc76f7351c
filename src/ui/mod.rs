pub mod progress;

pub use progress::{draw_dashboard, DashboardState, ProgressEvent};
