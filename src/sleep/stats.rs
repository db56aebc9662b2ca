use std::str::FromStr;

use anyhow::{anyhow, Error};
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SleepSession;

/// Quality assumed for a session that finished without a score.
/// Stands in for a missing score only; a stored 0 is a real score.
const DEFAULT_QUALITY: f64 = 70.0;
/// Gap between consecutive nights that ends a streak.
const STREAK_BREAK_DAYS: f64 = 2.0;
const CHART_LIMIT: usize = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatsRange {
    Week,
    Month,
    All,
}

impl StatsRange {
    fn window(&self) -> Option<Duration> {
        match self {
            StatsRange::Week => Some(Duration::days(7)),
            StatsRange::Month => Some(Duration::days(30)),
            StatsRange::All => None,
        }
    }
}

impl FromStr for StatsRange {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "week" => Ok(StatsRange::Week),
            "month" => Ok(StatsRange::Month),
            "all" => Ok(StatsRange::All),
            other => Err(anyhow!("unknown stats range '{other}' (expected week, month or all)")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SleepStats {
    /// Seconds.
    pub average_duration: f64,
    pub average_quality: f64,
    pub total_sessions: usize,
    pub best_streak: usize,
    pub total_recordings: usize,
    /// Average local bedtime as `H:MM`.
    pub avg_sleep_time: Option<String>,
    pub avg_wake_time: Option<String>,
}

fn has_duration(session: &SleepSession) -> bool {
    session.duration.map(|secs| secs != 0.0).unwrap_or(false)
}

fn in_range(session: &SleepSession, range: StatsRange, now: DateTime<Utc>) -> bool {
    match range.window() {
        Some(window) => session.start_time >= now - window,
        None => true,
    }
}

/// Aggregate figures for the insights view over finished sessions within `range`.
pub fn compute_stats<Tz: TimeZone>(
    sessions: &[SleepSession],
    range: StatsRange,
    now: DateTime<Utc>,
    tz: &Tz,
) -> SleepStats {
    let filtered: Vec<&SleepSession> = sessions
        .iter()
        .filter(|s| has_duration(s) && in_range(s, range, now))
        .collect();

    if filtered.is_empty() {
        return SleepStats::default();
    }

    let count = filtered.len() as f64;
    let total_duration: f64 = filtered.iter().filter_map(|s| s.duration).sum();
    let total_quality: f64 = filtered
        .iter()
        .map(|s| s.sleep_quality.map(f64::from).unwrap_or(DEFAULT_QUALITY))
        .sum();
    let total_recordings = filtered.iter().map(|s| s.audio_recordings.len()).sum();

    let bed_hours: Vec<f64> = filtered
        .iter()
        .map(|s| fractional_hour(&s.start_time, tz))
        .collect();
    let wake_hours: Vec<f64> = filtered
        .iter()
        .filter_map(|s| s.end_time.as_ref())
        .map(|end| fractional_hour(end, tz))
        .collect();

    SleepStats {
        average_duration: total_duration / count,
        average_quality: total_quality / count,
        total_sessions: filtered.len(),
        best_streak: best_streak(sessions),
        total_recordings,
        avg_sleep_time: mean(&bed_hours).map(format_clock),
        avg_wake_time: mean(&wake_hours).map(format_clock),
    }
}

/// Longest run of finished nights with no gap above two days, over the whole history.
pub fn best_streak(sessions: &[SleepSession]) -> usize {
    let mut sorted: Vec<&SleepSession> = sessions.iter().collect();
    sorted.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let mut current = 0;
    let mut best = 0;
    for (idx, session) in sorted.iter().enumerate() {
        if !has_duration(session) {
            continue;
        }
        current += 1;
        if let Some(next) = sorted.get(idx + 1) {
            let gap_days =
                (session.start_time - next.start_time).num_seconds().abs() as f64 / 86_400.0;
            if gap_days > STREAK_BREAK_DAYS {
                best = best.max(current);
                current = 0;
            }
        }
    }
    best.max(current)
}

/// Newest finished sessions within `range` for the duration chart, oldest first.
pub fn chart_sessions(
    sessions: &[SleepSession],
    range: StatsRange,
    now: DateTime<Utc>,
) -> Vec<&SleepSession> {
    let mut picked: Vec<&SleepSession> = sessions
        .iter()
        .filter(|s| has_duration(s) && in_range(s, range, now))
        .take(CHART_LIMIT)
        .collect();
    picked.reverse();
    picked
}

fn fractional_hour<Tz: TimeZone>(at: &DateTime<Utc>, tz: &Tz) -> f64 {
    let local = at.with_timezone(tz);
    f64::from(local.hour()) + f64::from(local.minute()) / 60.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn format_clock(hour: f64) -> String {
    let total_minutes = (hour * 60.0).round() as i64;
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(start: DateTime<Utc>, hours: f64, quality: Option<u8>) -> SleepSession {
        let mut session = SleepSession::begin(format!("s-{}", start.timestamp()), start, None);
        let secs = hours * 3600.0;
        session.end_time = Some(start + Duration::seconds(secs as i64));
        session.duration = Some(secs);
        session.sleep_quality = quality;
        session
    }

    fn night(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, 23, 0, 0).unwrap()
    }

    #[test]
    fn empty_history_yields_zeroed_stats() {
        let stats = compute_stats(&[], StatsRange::All, night(20), &Utc);
        assert_eq!(stats, SleepStats::default());
    }

    #[test]
    fn averages_over_finished_sessions() {
        let now = night(20);
        let sessions = vec![
            finished(night(19), 8.0, Some(90)),
            finished(night(18), 6.0, None),
            SleepSession::begin("active".into(), night(17), None),
        ];

        let stats = compute_stats(&sessions, StatsRange::Week, now, &Utc);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.average_duration, 7.0 * 3600.0);
        assert_eq!(stats.average_quality, 80.0);
        assert_eq!(stats.avg_sleep_time.as_deref(), Some("23:00"));
        // Wakes at 07:00 and 05:00.
        assert_eq!(stats.avg_wake_time.as_deref(), Some("6:00"));
    }

    #[test]
    fn stored_zero_quality_is_not_defaulted() {
        let now = night(20);
        let sessions = vec![finished(night(19), 1.0, Some(0)), finished(night(18), 8.0, None)];

        let stats = compute_stats(&sessions, StatsRange::Week, now, &Utc);
        assert_eq!(stats.average_quality, 35.0);
    }

    #[test]
    fn week_range_excludes_older_nights() {
        let now = night(20);
        let sessions = vec![finished(night(19), 8.0, Some(90)), finished(night(2), 8.0, Some(50))];

        assert_eq!(compute_stats(&sessions, StatsRange::Week, now, &Utc).total_sessions, 1);
        assert_eq!(compute_stats(&sessions, StatsRange::Month, now, &Utc).total_sessions, 2);
        assert_eq!(compute_stats(&sessions, StatsRange::All, now, &Utc).total_sessions, 2);
    }

    #[test]
    fn streak_breaks_on_gaps_over_two_days() {
        let sessions = vec![
            finished(night(20), 8.0, None),
            finished(night(19), 8.0, None),
            finished(night(18), 8.0, None),
            finished(night(10), 8.0, None),
            finished(night(8), 8.0, None),
        ];
        assert_eq!(best_streak(&sessions), 3);
    }

    #[test]
    fn chart_is_oldest_first_and_capped() {
        let now = night(30);
        let sessions: Vec<SleepSession> =
            (20..=29).rev().map(|day| finished(night(day), 7.5, None)).collect();

        let chart = chart_sessions(&sessions, StatsRange::All, now);
        assert_eq!(chart.len(), 7);
        assert_eq!(chart.first().unwrap().start_time, night(23));
        assert_eq!(chart.last().unwrap().start_time, night(29));
    }

    #[test]
    fn parses_range_names() {
        assert_eq!("Week".parse::<StatsRange>().unwrap(), StatsRange::Week);
        assert!("year".parse::<StatsRange>().is_err());
    }
}
