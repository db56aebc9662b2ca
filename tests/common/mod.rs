#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread::{self, ThreadId};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::time::Instant;

use sleeptrack_lib::{
    alarm::AlarmScheduler,
    clock::ManualClock,
    db::{Database, SessionStore},
    noise::{AudioInput, CapturedClip, ClipRequest, MicrophoneHandle},
    sleep::TrackingConfig,
    tracker::SleepTracker,
};

pub const QUIET_DB: f64 = -70.0;
pub const LOUD_DB: f64 = -20.0;

#[derive(Debug, Clone)]
pub struct ClipSpan {
    pub recording_id: String,
    pub session_id: String,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Default)]
pub struct MicLog {
    pub acquired: usize,
    pub released: usize,
    /// Thread each release ran on.
    pub released_on: Vec<ThreadId>,
    pub samples: usize,
    pub clips: Vec<ClipSpan>,
    pub discarded: usize,
    /// Set if a clip was started while another was still open.
    pub overlapped: bool,
    open: Option<(ClipRequest, Instant)>,
}

/// Microphone whose level the test sets by hand; time comes from tokio's clock.
pub struct ScriptedInput {
    level: Arc<Mutex<f64>>,
    log: Arc<Mutex<MicLog>>,
    fail_acquire: bool,
}

impl ScriptedInput {
    pub fn quiet() -> Arc<Self> {
        Arc::new(Self {
            level: Arc::new(Mutex::new(QUIET_DB)),
            log: Arc::new(Mutex::new(MicLog::default())),
            fail_acquire: false,
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            level: Arc::new(Mutex::new(QUIET_DB)),
            log: Arc::new(Mutex::new(MicLog::default())),
            fail_acquire: true,
        })
    }

    pub fn set_level(&self, db: f64) {
        *self.level.lock().unwrap() = db;
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, MicLog> {
        self.log.lock().unwrap()
    }
}

impl AudioInput for ScriptedInput {
    fn acquire(&self) -> Result<Box<dyn MicrophoneHandle>> {
        if self.fail_acquire {
            bail!("microphone permission denied");
        }
        self.log.lock().unwrap().acquired += 1;
        Ok(Box::new(ScriptedMic {
            level: Arc::clone(&self.level),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedMic {
    level: Arc<Mutex<f64>>,
    log: Arc<Mutex<MicLog>>,
}

impl MicrophoneHandle for ScriptedMic {
    fn sample_level(&mut self) -> Result<f64> {
        self.log.lock().unwrap().samples += 1;
        Ok(*self.level.lock().unwrap())
    }

    fn start_clip(&mut self, request: &ClipRequest) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.open.is_some() {
            log.overlapped = true;
        }
        log.open = Some((request.clone(), Instant::now()));
        Ok(())
    }

    fn finish_clip(&mut self) -> Result<CapturedClip> {
        let mut log = self.log.lock().unwrap();
        let (request, started) = log.open.take().ok_or_else(|| anyhow!("no open clip"))?;
        let finished = Instant::now();
        log.clips.push(ClipSpan {
            recording_id: request.recording_id.clone(),
            session_id: request.session_id.clone(),
            started,
            finished,
        });
        Ok(CapturedClip {
            uri: format!("mem://{}/{}", request.session_id, request.recording_id),
            duration_secs: (finished - started).as_secs_f64(),
        })
    }

    fn discard_clip(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.open.take().is_some() {
            log.discarded += 1;
        }
    }

    fn release(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.released += 1;
        log.released_on.push(thread::current().id());
    }
}

#[derive(Default)]
pub struct RecordingAlarms {
    pub scheduled: Mutex<Vec<DateTime<Utc>>>,
    pub cancels: AtomicUsize,
}

impl RecordingAlarms {
    pub fn scheduled(&self) -> Vec<DateTime<Utc>> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl AlarmScheduler for RecordingAlarms {
    fn schedule(&self, alarm_time: DateTime<Utc>, _now: DateTime<Utc>) -> Result<()> {
        self.scheduled.lock().unwrap().push(alarm_time);
        Ok(())
    }

    fn cancel_all(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub tracker: SleepTracker,
    pub input: Arc<ScriptedInput>,
    pub alarms: Arc<RecordingAlarms>,
    pub clock: Arc<ManualClock>,
    pub db: Database,
    pub store: SessionStore,
    pub dir: TempDir,
}

pub fn bed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 14, 23, 0, 0).unwrap()
}

fn open_db(dir: &TempDir) -> Database {
    Database::new(dir.path().join("sleeptrack.sqlite3")).unwrap()
}

pub fn open_store(dir: &TempDir) -> SessionStore {
    SessionStore::new(open_db(dir))
}

pub fn harness_with(input: Arc<ScriptedInput>, config: TrackingConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let store = SessionStore::new(db.clone());
    let alarms = Arc::new(RecordingAlarms::default());
    let clock = Arc::new(ManualClock::utc(bed_time()));

    let tracker = SleepTracker::new(
        store.clone(),
        input.clone(),
        alarms.clone(),
        clock.clone(),
        config,
    );

    Harness {
        tracker,
        input,
        alarms,
        clock,
        db,
        store,
        dir,
    }
}

pub fn harness() -> Harness {
    harness_with(ScriptedInput::quiet(), TrackingConfig::default())
}
