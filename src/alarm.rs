use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::audio::PlaybackHandle;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Local-notification style alarm delivery.
pub trait AlarmScheduler: Send + Sync {
    /// Arrange for the alarm to fire at `alarm_time`; `now` is the caller's notion of the present.
    fn schedule(&self, alarm_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<()>;

    fn cancel_all(&self);
}

/// Fires alarms in-process: a tokio task per alarm that sleeps, then plays a tone.
pub struct LocalAlarmScheduler {
    playback: PlaybackHandle,
    tone_length: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalAlarmScheduler {
    pub fn new(playback: PlaybackHandle, tone_length: Duration) -> Self {
        Self {
            playback,
            tone_length,
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl AlarmScheduler for LocalAlarmScheduler {
    fn schedule(&self, alarm_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        let delay = (alarm_time - now)
            .to_std()
            .map_err(|_| anyhow!("alarm time {alarm_time} is not in the future"))?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| anyhow!("no async runtime to schedule the alarm on: {err}"))?;

        let playback = self.playback.clone();
        let tone_length = self.tone_length;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            log_info!("Wake Up! Time to wake up at your optimal sleep cycle");
            if let Err(err) = playback.play_alarm(tone_length) {
                log_error!("failed to play alarm tone: {err:?}");
            }
        });

        let mut pending = self
            .pending
            .lock()
            .map_err(|_| anyhow!("alarm list lock poisoned"))?;
        pending.retain(|task| !task.is_finished());
        pending.push(handle);

        log_info!("alarm scheduled for {alarm_time} (in {}s)", delay.as_secs());
        Ok(())
    }

    fn cancel_all(&self) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in pending.drain(..) {
            task.abort();
        }
    }
}

/// Scheduler for environments without alarm delivery; only logs.
#[derive(Debug, Default)]
pub struct NoopAlarmScheduler;

impl AlarmScheduler for NoopAlarmScheduler {
    fn schedule(&self, alarm_time: DateTime<Utc>, _now: DateTime<Utc>) -> Result<()> {
        log_info!("alarm delivery unavailable, ignoring alarm at {alarm_time}");
        Ok(())
    }

    fn cancel_all(&self) {}
}
