use chrono::{DateTime, Duration, Utc};

use crate::models::WakeTimeOption;
use crate::sleep::config::TrackingConfig;

/// Wake times that land on a cycle boundary after sleep onset, fewest cycles first.
///
/// Onset is `bed_time` plus the fall-asleep latency; each option is onset plus
/// `cycles * cycle length` for every cycle count in `min_cycles..=max_cycles`.
pub fn calculate_wake_times(bed_time: DateTime<Utc>, config: &TrackingConfig) -> Vec<WakeTimeOption> {
    let onset = bed_time + Duration::minutes(i64::from(config.fall_asleep_minutes));
    let cycle_minutes = i64::from(config.sleep_cycle_minutes);

    (config.min_cycles..=config.max_cycles)
        .map(|cycles| WakeTimeOption {
            time: onset + Duration::minutes(i64::from(cycles) * cycle_minutes),
            cycles,
            label: cycle_label(cycles, config.sleep_cycle_minutes),
        })
        .collect()
}

fn cycle_label(cycles: u32, cycle_minutes: u32) -> String {
    let hours = f64::from(cycles * cycle_minutes) / 60.0;
    format!("{cycles} cycles ({hours}h)")
}
