use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{AudioRecording, SleepSession};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    #[default]
    Idle,
    Tracking,
}

/// The single live slot: at most one active session exists at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub status: TrackerStatus,
    pub session: Option<SleepSession>,
}

/// Shared between the lifecycle manager and the noise monitor task.
pub type SharedTrackerState = Arc<Mutex<TrackerState>>;

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTrackerState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackerStatus::Tracking
    }

    /// Id of the session currently accepting recordings.
    pub fn active_session_id(&self) -> Option<&str> {
        self.session
            .as_ref()
            .filter(|_| self.is_tracking())
            .map(|session| session.id.as_str())
    }

    pub fn begin_session(&mut self, session: SleepSession) {
        *self = Self {
            status: TrackerStatus::Tracking,
            session: Some(session),
        };
    }

    /// Append to the active session if it is still the one the recording belongs to.
    pub fn append_recording(&mut self, session_id: &str, recording: AudioRecording) -> bool {
        if self.active_session_id() != Some(session_id) {
            return false;
        }
        match self.session.as_mut() {
            Some(session) => {
                session.audio_recordings.push(recording);
                true
            }
            None => false,
        }
    }

    pub fn set_alarm_time(&mut self, alarm_time: Option<DateTime<Utc>>) -> Option<&SleepSession> {
        let session = self.session.as_mut()?;
        session.alarm_time = alarm_time;
        Some(session)
    }

    /// Hand the active session over for finalization and go back to idle.
    pub fn take_session(&mut self) -> Option<SleepSession> {
        let session = self.session.take();
        self.status = TrackerStatus::Idle;
        session
    }
}
