use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::audio::ambient::AmbientSound;
use crate::sleep::{chart_sessions, QualityBand, StatsRange};
use crate::AppState;

#[derive(Debug, Parser)]
#[command(name = "sleeptrack", version, about = "Track sleep sessions and capture night-time noise")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a session, keep listening until Ctrl-C, then finish it
    Track {
        /// Alarm time as HH:MM (next occurrence, local time)
        #[arg(long)]
        alarm: Option<String>,
    },
    /// Cycle-aligned wake times for a bed time
    WakeTimes {
        /// Bed time as HH:MM (next occurrence, local time); defaults to now
        #[arg(long)]
        bed: Option<String>,
    },
    /// Completed sessions, newest first
    History,
    /// Aggregate statistics
    Stats {
        #[arg(long, default_value = "week")]
        range: StatsRange,
    },
    /// Remove a completed session
    Delete { id: String },
    /// Play back a captured noise recording
    Play { recording_id: String },
    /// Loop an ambient sound (ocean, rain, wind, nature) until Ctrl-C
    Sounds {
        sound: AmbientSound,
        /// Volume from 0.0 to 1.0; remembered for next time
        #[arg(long)]
        volume: Option<f32>,
        /// Start muted; remembered until --unmute
        #[arg(long, conflicts_with = "unmute")]
        mute: bool,
        #[arg(long)]
        unmute: bool,
    },
}

/// Longest a recording is allowed to keep the `play` command alive.
const PLAYBACK_LIMIT: Duration = Duration::from_secs(120);

/// Next local occurrence of `HH:MM` at or after `now`.
fn next_occurrence(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .with_context(|| format!("expected HH:MM, got '{raw}'"))?;

    let local_now = now.with_timezone(&Local);
    let mut date = local_now.date_naive();
    loop {
        let candidate = Local
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(|| anyhow!("{raw} does not exist on {date} in local time"))?;
        if candidate >= local_now {
            return Ok(candidate.with_timezone(&Utc));
        }
        date = date
            .succ_opt()
            .ok_or_else(|| anyhow!("date overflow resolving {raw}"))?;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow<'a> {
    #[serde(flatten)]
    session: &'a crate::SleepSession,
    quality_band: Option<&'static str>,
}

pub async fn dispatch(command: Command, app: &AppState) -> Result<()> {
    let tracker = &app.tracker;

    match command {
        Command::Track { alarm } => {
            let alarm = alarm
                .as_deref()
                .map(|raw| next_occurrence(raw, Utc::now()))
                .transpose()?;

            let session = tracker.start_tracking(alarm).await;
            print_json(&session)?;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;

            if let Some(completed) = tracker.stop_tracking().await {
                print_json(&completed)?;
            }
        }
        Command::WakeTimes { bed } => {
            let bed_time = match bed {
                Some(raw) => next_occurrence(&raw, Utc::now())?,
                None => Utc::now(),
            };
            print_json(&tracker.calculate_wake_times(bed_time))?;
        }
        Command::History => {
            let sessions = tracker.sessions().await;
            let rows: Vec<HistoryRow<'_>> = sessions
                .iter()
                .map(|session| HistoryRow {
                    session,
                    quality_band: session
                        .sleep_quality
                        .map(|q| QualityBand::from_score(q).as_str()),
                })
                .collect();
            print_json(&rows)?;
        }
        Command::Stats { range } => {
            let stats = tracker.stats(range).await;
            let sessions = tracker.sessions().await;
            let chart = chart_sessions(&sessions, range, Utc::now());
            print_json(&serde_json::json!({ "stats": stats, "chart": chart }))?;
        }
        Command::Delete { id } => {
            if !tracker.delete_session(&id).await {
                println!("no session with id {id}");
            }
        }
        Command::Play { recording_id } => {
            let recording = tracker
                .find_recording(&recording_id)
                .await
                .ok_or_else(|| anyhow!("no recording with id {recording_id}"))?;

            app.playback.play_file(PathBuf::from(&recording.uri))?;
            let started = tokio::time::Instant::now();
            while app.playback.is_playing() && started.elapsed() < PLAYBACK_LIMIT {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            app.playback.stop()?;
        }
        Command::Sounds {
            sound,
            volume,
            mute,
            unmute,
        } => {
            let mut prefs = app.settings.sounds();
            if let Some(volume) = volume {
                prefs.volume = volume;
            }
            if mute {
                prefs.muted = true;
            }
            if unmute {
                prefs.muted = false;
            }
            if volume.is_some() || mute || unmute {
                app.settings.update_sounds(prefs)?;
                prefs = app.settings.sounds();
            }

            app.playback.play_ambient(sound)?;
            app.playback.set_volume(prefs.effective_volume())?;
            println!(
                "playing {} at {:.0}%{}; Ctrl-C to stop",
                sound.name(),
                prefs.volume * 100.0,
                if prefs.muted { " (muted)" } else { "" }
            );

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            app.playback.stop()?;
        }
    }

    Ok(())
}
