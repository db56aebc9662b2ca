use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to a clip that is still recording when tracking stops.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CapturePolicy {
    /// Abort the clip, delete whatever was written and append nothing.
    #[default]
    Discard,
    /// Finalize the clip at stop time and append it before the session freezes.
    Keep,
}

/// Tunable constants for wake-time math and noise detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingConfig {
    /// Level above which a sample counts as a noise event (dBFS, 0 is full scale).
    pub noise_threshold_db: f64,

    /// Fixed length of every captured clip.
    pub clip_duration_secs: u64,

    /// Microphone sampling period.
    pub sample_interval_ms: u64,

    pub in_flight_capture: CapturePolicy,

    /// Assumed delay between going to bed and falling asleep.
    pub fall_asleep_minutes: u32,
    pub sleep_cycle_minutes: u32,
    pub min_cycles: u32,
    pub max_cycles: u32,

    /// How long the alarm tone plays once triggered.
    pub alarm_tone_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            noise_threshold_db: -45.0,
            clip_duration_secs: 15,
            sample_interval_ms: 100,
            in_flight_capture: CapturePolicy::Discard,
            fall_asleep_minutes: 14,
            sleep_cycle_minutes: 90,
            min_cycles: 4,
            max_cycles: 6,
            alarm_tone_secs: 30,
        }
    }
}

impl TrackingConfig {
    pub fn clip_duration(&self) -> Duration {
        Duration::from_secs(self.clip_duration_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}
