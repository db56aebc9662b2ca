use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    alarm::AlarmScheduler,
    clock::Clock,
    db::SessionStore,
    models::{AudioRecording, SleepSession, WakeTimeOption},
    noise::{AudioInput, NoiseMonitor},
    sleep::{calculate_wake_times, compute_stats, deep_sleep_percent, score, SleepStats, StatsRange, TrackingConfig},
};

use super::state::{SharedTrackerState, TrackerState, TrackerStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Live state as the presentation layer sees it.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub status: TrackerStatus,
    pub current_session: Option<SleepSession>,
    pub is_tracking: bool,
    pub is_loading: bool,
    /// False while tracking without a microphone.
    pub noise_detection: bool,
    pub session_count: usize,
}

/// Owns the active-session slot and the completed history, and drives the noise monitor.
///
/// Cloning yields another handle onto the same tracker.
#[derive(Clone)]
pub struct SleepTracker {
    state: SharedTrackerState,
    history: Arc<RwLock<Vec<SleepSession>>>,
    loading: Arc<AtomicBool>,
    /// Serializes start/stop/delete so each sees the previous one's result.
    lifecycle: Arc<Mutex<()>>,
    monitor: Arc<Mutex<NoiseMonitor>>,
    store: SessionStore,
    input: Arc<dyn AudioInput>,
    alarms: Arc<dyn AlarmScheduler>,
    clock: Arc<dyn Clock>,
    config: TrackingConfig,
}

impl SleepTracker {
    pub fn new(
        store: SessionStore,
        input: Arc<dyn AudioInput>,
        alarms: Arc<dyn AlarmScheduler>,
        clock: Arc<dyn Clock>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            state: TrackerState::shared(),
            history: Arc::new(RwLock::new(Vec::new())),
            loading: Arc::new(AtomicBool::new(true)),
            lifecycle: Arc::new(Mutex::new(())),
            monitor: Arc::new(Mutex::new(NoiseMonitor::new())),
            store,
            input,
            alarms,
            clock,
            config,
        }
    }

    /// Replace the in-memory history with whatever the store holds.
    pub async fn load_history(&self) {
        self.loading.store(true, Ordering::SeqCst);
        let sessions = self.store.load().await;
        *self.history.write().await = sessions;
        self.loading.store(false, Ordering::SeqCst);
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn is_tracking(&self) -> bool {
        self.state.lock().await.is_tracking()
    }

    pub async fn current_session(&self) -> Option<SleepSession> {
        self.state.lock().await.session.clone()
    }

    /// Completed sessions, newest first by insertion.
    pub async fn sessions(&self) -> Vec<SleepSession> {
        self.history.read().await.clone()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock().await.clone();
        TrackerSnapshot {
            is_tracking: state.is_tracking(),
            status: state.status,
            current_session: state.session,
            is_loading: self.is_loading(),
            noise_detection: self.monitor.lock().await.is_running(),
            session_count: self.history.read().await.len(),
        }
    }

    pub fn calculate_wake_times(&self, bed_time: DateTime<Utc>) -> Vec<WakeTimeOption> {
        calculate_wake_times(bed_time, &self.config)
    }

    pub async fn stats(&self, range: StatsRange) -> SleepStats {
        let now = self.clock.now();
        let offset = self.clock.offset_at(now);
        compute_stats(&self.history.read().await, range, now, &offset)
    }

    /// Look a recording up across the history and the active session.
    pub async fn find_recording(&self, recording_id: &str) -> Option<AudioRecording> {
        if let Some(found) = self
            .history
            .read()
            .await
            .iter()
            .find_map(|session| session.recording(recording_id))
        {
            return Some(found.clone());
        }

        self.state
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|session| session.recording(recording_id))
            .cloned()
    }

    /// Begin a session. While one is already active this is a no-op returning the active session.
    pub async fn start_tracking(&self, alarm_time: Option<DateTime<Utc>>) -> SleepSession {
        let _op = self.lifecycle.lock().await;

        let session = {
            let mut state = self.state.lock().await;
            if let Some(active) = state.session.as_ref().filter(|_| state.is_tracking()) {
                log_warn!("start requested while session {} is active; ignoring", active.id);
                return active.clone();
            }

            let session = SleepSession::begin(Uuid::new_v4().to_string(), self.clock.now(), alarm_time);
            state.begin_session(session.clone());
            session
        };

        log_info!("sleep session {} started", session.id);

        if let Some(alarm) = alarm_time {
            self.schedule_alarm(alarm);
        }

        let started = self
            .monitor
            .lock()
            .await
            .start(
                session.id.clone(),
                Arc::clone(&self.input),
                Arc::clone(&self.state),
                Arc::clone(&self.clock),
                self.config.clone(),
            )
            .await;

        if let Err(err) = started {
            log_error!(
                "noise detection unavailable for session {}, tracking without it: {err:?}",
                session.id
            );
        }

        session
    }

    /// Finish the active session: stop the monitor, score it, persist it, go idle.
    ///
    /// Returns the completed session, or `None` when nothing was being tracked.
    pub async fn stop_tracking(&self) -> Option<SleepSession> {
        let _op = self.lifecycle.lock().await;

        if !self.state.lock().await.is_tracking() {
            log_info!("stop requested with no active session; nothing to do");
            return None;
        }

        // The monitor must be fully stopped before the session is read so that
        // no recording lands after it is frozen.
        if let Err(err) = self.monitor.lock().await.stop().await {
            log_error!("noise monitor did not shut down cleanly: {err:?}");
        }
        self.alarms.cancel_all();

        let active = self.state.lock().await.session.clone()?;
        let completed = self.finalize(active);

        let snapshot = {
            let mut history = self.history.write().await;
            history.insert(0, completed.clone());
            history.clone()
        };
        self.persist(&snapshot).await;

        self.state.lock().await.take_session();

        log_info!(
            "sleep session {} completed: {:.0}s, quality {}, {} interruptions",
            completed.id,
            completed.duration.unwrap_or_default(),
            completed.sleep_quality.unwrap_or_default(),
            completed.interruptions.unwrap_or_default()
        );

        Some(completed)
    }

    /// Remove a completed session by id. Returns whether anything was removed.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let _op = self.lifecycle.lock().await;

        let snapshot = {
            let mut history = self.history.write().await;
            let before = history.len();
            history.retain(|session| session.id != session_id);
            if history.len() == before {
                return false;
            }
            history.clone()
        };

        self.persist(&snapshot).await;
        log_info!("deleted session {session_id}");
        true
    }

    /// Change the alarm on the active session and reschedule delivery.
    pub async fn set_alarm_time(&self, alarm_time: Option<DateTime<Utc>>) -> Option<SleepSession> {
        let _op = self.lifecycle.lock().await;

        let updated = {
            let mut state = self.state.lock().await;
            if !state.is_tracking() {
                return None;
            }
            state.set_alarm_time(alarm_time).cloned()
        };

        self.alarms.cancel_all();
        if let Some(alarm) = alarm_time {
            self.schedule_alarm(alarm);
        }
        updated
    }

    fn schedule_alarm(&self, alarm: DateTime<Utc>) {
        let now = self.clock.now();
        if alarm <= now {
            log_warn!("alarm at {alarm} is already in the past; not scheduling");
            return;
        }
        if let Err(err) = self.alarms.schedule(alarm, now) {
            log_error!("Failed to schedule alarm: {err:?}");
        }
    }

    fn finalize(&self, active: SleepSession) -> SleepSession {
        let end_time = self.clock.now();
        let duration_secs = ((end_time - active.start_time).num_milliseconds().max(0)) as f64 / 1000.0;
        let offset = self.clock.offset_at(active.start_time);

        let interruptions = active.audio_recordings.len() as u32;
        let sleep_quality = score(&active, duration_secs, &offset);

        SleepSession {
            end_time: Some(end_time),
            duration: Some(duration_secs),
            sleep_quality: Some(sleep_quality),
            interruptions: Some(interruptions),
            deep_sleep_percent: Some(deep_sleep_percent(interruptions)),
            ..active
        }
    }

    async fn persist(&self, sessions: &[SleepSession]) {
        if let Err(err) = self.store.save(sessions).await {
            log_error!("Failed to save sessions: {err:?}");
        }
    }
}
