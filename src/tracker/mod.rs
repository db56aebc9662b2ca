pub mod controller;
pub mod state;

pub use controller::{SleepTracker, TrackerSnapshot};
pub use state::{SharedTrackerState, TrackerState, TrackerStatus};
