use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::sleep::TrackingConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Ambient-sound player preferences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SoundSettings {
    /// 0.0 to 1.0.
    pub volume: f32,
    pub muted: bool,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            volume: 0.7,
            muted: false,
        }
    }
}

impl SoundSettings {
    /// Volume to hand the player, honouring mute.
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserSettings {
    tracking: TrackingConfig,
    sounds: SoundSettings,
}

/// Persisted tunables, kept in `settings.json` next to the database.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("Ignoring unreadable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn tracking(&self) -> TrackingConfig {
        self.read().tracking.clone()
    }

    pub fn sounds(&self) -> SoundSettings {
        self.read().sounds
    }

    /// Replace the sound preferences and write the file straight away.
    pub fn update_sounds(&self, sounds: SoundSettings) -> Result<()> {
        let mut guard = self.write();
        guard.sounds = SoundSettings {
            volume: sounds.volume.clamp(0.0, 1.0),
            ..sounds
        };
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::CapturePolicy;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.tracking(), TrackingConfig::default());
    }

    #[test]
    fn sound_updates_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "tracking": { "inFlightCapture": "keep" } }"#).unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.sounds(), SoundSettings::default());
        store
            .update_sounds(SoundSettings {
                volume: 1.4,
                muted: true,
            })
            .unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(
            reopened.sounds(),
            SoundSettings {
                volume: 1.0,
                muted: true
            }
        );
        // Writing sounds leaves the tracking section intact.
        assert_eq!(reopened.tracking().in_flight_capture, CapturePolicy::Keep);
    }

    #[test]
    fn mute_silences_without_forgetting_volume() {
        let sounds = SoundSettings {
            volume: 0.4,
            muted: true,
        };
        assert_eq!(sounds.effective_volume(), 0.0);
        assert_eq!(
            SoundSettings {
                muted: false,
                ..sounds
            }
            .effective_volume(),
            0.4
        );
        assert_eq!(SoundSettings::default().effective_volume(), 0.7);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "tracking": { "clipDurationSecs": 20 } }"#).unwrap();

        let tracking = SettingsStore::new(path).unwrap().tracking();
        assert_eq!(tracking.clip_duration_secs, 20);
        assert_eq!(tracking.sample_interval_ms, 100);
        assert_eq!(tracking.in_flight_capture, CapturePolicy::Discard);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json at all").unwrap();

        assert_eq!(SettingsStore::new(path).unwrap().tracking(), TrackingConfig::default());
    }
}
