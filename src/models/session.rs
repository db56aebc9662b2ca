use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bounded noise clip captured while a session was active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioRecording {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Opaque reference to the captured clip (a file path for the device microphone).
    pub uri: String,
    /// Clip length in seconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SleepSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between `start_time` and `end_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub audio_recordings: Vec<AudioRecording>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruptions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_sleep_percent: Option<u8>,
}

impl SleepSession {
    pub fn begin(id: String, start_time: DateTime<Utc>, alarm_time: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            duration: None,
            audio_recordings: Vec::new(),
            alarm_time,
            sleep_quality: None,
            interruptions: None,
            deep_sleep_percent: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn recording(&self, recording_id: &str) -> Option<&AudioRecording> {
        self.audio_recordings
            .iter()
            .find(|recording| recording.id == recording_id)
    }
}

/// Candidate wake time aligned to a whole number of sleep cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WakeTimeOption {
    pub time: DateTime<Utc>,
    pub cycles: u32,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_session() -> SleepSession {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        let mut session = SleepSession::begin(
            "s-1".into(),
            start,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 6, 44, 0).unwrap()),
        );
        session.audio_recordings.push(AudioRecording {
            id: "r-1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 2, 13, 7).unwrap(),
            uri: "/tmp/r-1.wav".into(),
            duration: 15.0,
            noise_level: Some(-31.5),
        });
        session.end_time = Some(Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap());
        session.duration = Some(28_800.0);
        session.sleep_quality = Some(95);
        session.interruptions = Some(1);
        session.deep_sleep_percent = Some(32);
        session
    }

    #[test]
    fn serializes_with_camel_case_string_timestamps() {
        let json = serde_json::to_value(sample_session()).unwrap();
        assert_eq!(json["startTime"], "2026-03-01T23:00:00Z");
        assert_eq!(json["alarmTime"], "2026-03-02T06:44:00Z");
        assert_eq!(json["audioRecordings"][0]["noiseLevel"], -31.5);
        assert_eq!(json["deepSleepPercent"], 32);
    }

    #[test]
    fn completed_session_survives_json_round_trip() {
        let session = sample_session();
        let encoded = serde_json::to_string(&session).unwrap();
        let decoded: SleepSession = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, session);
    }

    #[test]
    fn active_session_omits_unset_fields() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        let session = SleepSession::begin("s-2".into(), start, None);
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("endTime").is_none());
        assert!(json.get("sleepQuality").is_none());

        let decoded: SleepSession = serde_json::from_value(json).unwrap();
        assert!(!decoded.is_completed());
        assert!(decoded.audio_recordings.is_empty());
    }
}
