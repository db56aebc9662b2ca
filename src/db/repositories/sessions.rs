use anyhow::{Context, Result};

use crate::db::connection::Database;
use crate::models::SleepSession;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Storage key holding the whole session history as one JSON array.
pub const SESSIONS_KEY: &str = "sleep_sessions";

/// Persists completed sessions, newest first, as a single serialized array.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn try_load(&self) -> Result<Vec<SleepSession>> {
        let Some(raw) = self.db.get_value(SESSIONS_KEY).await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&raw).context("failed to decode stored session history")
    }

    /// Load history; any failure degrades to an empty list.
    pub async fn load(&self) -> Vec<SleepSession> {
        match self.try_load().await {
            Ok(sessions) => {
                log_info!("Loaded {} sessions from history", sessions.len());
                sessions
            }
            Err(err) => {
                log_error!("Failed to load sessions: {err:?}");
                Vec::new()
            }
        }
    }

    /// Overwrite the stored history with `sessions`.
    pub async fn save(&self, sessions: &[SleepSession]) -> Result<()> {
        let encoded = serde_json::to_string(sessions).context("failed to encode session history")?;
        self.db
            .put_value(SESSIONS_KEY, encoded)
            .await
            .context("failed to write session history")
    }
}
