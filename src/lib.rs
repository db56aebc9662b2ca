pub mod alarm;
pub mod audio;
mod cli;
pub mod clock;
pub mod db;
pub mod models;
pub mod noise;
pub mod settings;
pub mod sleep;
pub mod tracker;
pub mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;

use alarm::LocalAlarmScheduler;
use audio::PlaybackHandle;
use clock::SystemClock;
use db::{Database, SessionStore};
use noise::CpalInput;
use settings::SettingsStore;
use tracker::SleepTracker;

pub use models::{AudioRecording, SleepSession, WakeTimeOption};
pub use tracker::TrackerSnapshot;

/// Everything a front-end needs, wired against the real device and disk.
pub struct AppState {
    pub db: Database,
    pub tracker: SleepTracker,
    pub settings: SettingsStore,
    pub playback: PlaybackHandle,
}

/// `SLEEPTRACK_DATA_DIR` if set, otherwise the platform data directory.
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("SLEEPTRACK_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }

    ProjectDirs::from("com", "sleeptrack", "sleeptrack")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("could not determine a data directory for this platform"))
}

/// Open storage, load settings and history, and build the tracker.
pub async fn bootstrap(data_dir: PathBuf) -> Result<AppState> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("sleeptrack.sqlite3"))?;
    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let config = settings.tracking();

    let playback = PlaybackHandle::new();
    let alarms = LocalAlarmScheduler::new(
        playback.clone(),
        Duration::from_secs(config.alarm_tone_secs),
    );
    let input = CpalInput::new(data_dir.join("recordings"));

    let tracker = SleepTracker::new(
        SessionStore::new(database.clone()),
        Arc::new(input),
        Arc::new(alarms),
        Arc::new(SystemClock),
        config,
    );
    tracker.load_history().await;

    Ok(AppState {
        db: database,
        tracker,
        settings,
        playback,
    })
}

pub fn run() {
    utils::logging::init_logging();

    log::info!("sleeptrack starting up...");

    let args = cli::Cli::parse();

    let result = (|| -> Result<()> {
        let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
        runtime.block_on(async move {
            let app = bootstrap(resolve_data_dir()?).await?;
            let outcome = cli::dispatch(args.command, &app).await;
            if let Err(err) = app.db.close().await {
                log::warn!("database did not close cleanly: {err:?}");
            }
            outcome
        })
    })();

    if let Err(err) = result {
        log::error!("sleeptrack failed: {err:?}");
        std::process::exit(1);
    }
}
