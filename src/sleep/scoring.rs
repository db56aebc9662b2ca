use chrono::{TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::models::SleepSession;

const BASE_SCORE: i32 = 70;

/// Compute the post-hoc sleep quality score (0-100) for a finished session.
///
/// Additive heuristic over three factors: total duration, number of captured
/// noise recordings, and the local hour the session started in. `tz` decides
/// what "local" means for the bedtime factor.
pub fn score<Tz: TimeZone>(session: &SleepSession, duration_secs: f64, tz: &Tz) -> u8 {
    let start_hour = session.start_time.with_timezone(tz).hour();

    let total = BASE_SCORE
        + score_duration(duration_secs)
        + score_interruptions(session.audio_recordings.len())
        + score_bedtime(start_hour);

    total.clamp(0, 100) as u8
}

/// 7-9h is ideal, 6-10h acceptable, anything else is penalised.
fn score_duration(duration_secs: f64) -> i32 {
    let hours = duration_secs / 3600.0;
    if (7.0..=9.0).contains(&hours) {
        20
    } else if (6.0..=10.0).contains(&hours) {
        10
    } else {
        -10
    }
}

fn score_interruptions(recording_count: usize) -> i32 {
    match recording_count {
        0 => 10,
        1..=2 => 5,
        3..=5 => -5,
        _ => -15,
    }
}

/// Going to bed between 21:00 and 01:59 helps; 02:00-05:59 hurts.
fn score_bedtime(start_hour: u32) -> i32 {
    match start_hour {
        21..=23 | 0 | 1 => 5,
        2..=5 => -5,
        _ => 0,
    }
}

/// Cosmetic deep-sleep share derived from the interruption count, bounded to 20-45%.
pub fn deep_sleep_percent(interruptions: u32) -> u8 {
    let raw = 35 - i64::from(interruptions) * 3;
    raw.clamp(20, 45) as u8
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QualityBand {
    Excellent,
    Good,
    Poor,
}

impl QualityBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => QualityBand::Excellent,
            60..=79 => QualityBand::Good,
            _ => QualityBand::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityBand::Excellent => "Excellent",
            QualityBand::Good => "Good",
            QualityBand::Poor => "Poor",
        }
    }
}
