pub mod config;
pub mod scoring;
pub mod stats;
pub mod wake_times;

pub use config::{CapturePolicy, TrackingConfig};
pub use scoring::{deep_sleep_percent, score, QualityBand};
pub use stats::{chart_sessions, compute_stats, SleepStats, StatsRange};
pub use wake_times::calculate_wake_times;
