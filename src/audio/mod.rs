pub mod ambient;

use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use rodio::{source::SineWave, Decoder, OutputStream, Sink, Source};

use ambient::{AmbientSound, AmbientSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const ALARM_FREQUENCY_HZ: f32 = 880.0;
const ALARM_GAIN: f32 = 0.3;
/// How often the thread re-checks whether its sink has drained.
const IDLE_POLL: Duration = Duration::from_millis(200);

enum PlaybackCommand {
    PlayFile(PathBuf),
    PlayAlarm(Duration),
    PlayAmbient(AmbientSound),
    Stop,
    SetVolume(f32),
}

/// Handle to the playback thread used for recorded clips, the wake-up tone and ambient loops.
///
/// rodio's output stream is not `Send`, so all audio objects stay on a dedicated
/// thread that is spawned lazily on first use.
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: Arc<Mutex<Option<Sender<PlaybackCommand>>>>,
    is_playing: Arc<AtomicBool>,
}

impl Default for PlaybackHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            is_playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<PlaybackCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("playback handle lock poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<PlaybackCommand>();
        let is_playing = Arc::clone(&self.is_playing);

        thread::Builder::new()
            .name("sleeptrack-playback".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn fresh_sink(stream: &mut Option<OutputStream>, sink: &mut Option<Sink>) -> Result<()> {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    let (s, handle) =
                        OutputStream::try_default().context("failed to open audio output")?;
                    let new_sink = Sink::try_new(&handle).context("failed to create audio sink")?;
                    *stream = Some(s);
                    *sink = Some(new_sink);
                    Ok(())
                }

                loop {
                    let cmd = match rx.recv_timeout(IDLE_POLL) {
                        Ok(cmd) => cmd,
                        Err(RecvTimeoutError::Timeout) => {
                            let playing = sink.as_ref().map(|s| !s.empty()).unwrap_or(false);
                            is_playing.store(playing, Ordering::SeqCst);
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    let result = match cmd {
                        PlaybackCommand::PlayFile(path) => {
                            fresh_sink(&mut _stream, &mut sink).and_then(|()| {
                                let file = File::open(&path)
                                    .with_context(|| format!("failed to open {}", path.display()))?;
                                let source = Decoder::new(BufReader::new(file))
                                    .with_context(|| format!("failed to decode {}", path.display()))?;
                                if let Some(ref s) = sink {
                                    s.append(source);
                                }
                                Ok(())
                            })
                        }
                        PlaybackCommand::PlayAlarm(length) => {
                            fresh_sink(&mut _stream, &mut sink).map(|()| {
                                if let Some(ref s) = sink {
                                    s.append(
                                        SineWave::new(ALARM_FREQUENCY_HZ)
                                            .take_duration(length)
                                            .amplify(ALARM_GAIN),
                                    );
                                }
                            })
                        }
                        PlaybackCommand::PlayAmbient(kind) => {
                            fresh_sink(&mut _stream, &mut sink).map(|()| {
                                if let Some(ref s) = sink {
                                    s.append(AmbientSource::new(kind));
                                }
                            })
                        }
                        PlaybackCommand::Stop => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                            Ok(())
                        }
                        PlaybackCommand::SetVolume(v) => {
                            if let Some(ref s) = sink {
                                s.set_volume(v.clamp(0.0, 1.0));
                            }
                            Ok(())
                        }
                    };

                    if let Err(err) = result {
                        log_error!("playback command failed: {err:?}");
                    }
                    let playing = sink.as_ref().map(|s| !s.empty()).unwrap_or(false);
                    is_playing.store(playing, Ordering::SeqCst);
                }
            })
            .context("failed to spawn playback thread")?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, command: PlaybackCommand) -> Result<()> {
        self.ensure_thread()?
            .send(command)
            .map_err(|_| anyhow!("playback thread has exited"))
    }

    /// Queue a command that starts something audible; `is_playing` flips immediately.
    fn start(&self, command: PlaybackCommand) -> Result<()> {
        self.is_playing.store(true, Ordering::SeqCst);
        let sent = self.send(command);
        if sent.is_err() {
            self.is_playing.store(false, Ordering::SeqCst);
        }
        sent
    }

    pub fn play_file(&self, path: PathBuf) -> Result<()> {
        log_info!("playing {}", path.display());
        self.start(PlaybackCommand::PlayFile(path))
    }

    pub fn play_alarm(&self, length: Duration) -> Result<()> {
        self.start(PlaybackCommand::PlayAlarm(length))
    }

    /// Loop `sound` until stopped, replacing whatever was playing.
    pub fn play_ambient(&self, sound: AmbientSound) -> Result<()> {
        log_info!("playing ambient {}", sound.name());
        self.start(PlaybackCommand::PlayAmbient(sound))
    }

    /// Applies to the current sink only; a later play starts at full volume.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(PlaybackCommand::SetVolume(volume))
    }

    pub fn stop(&self) -> Result<()> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(PlaybackCommand::Stop);
        }
        Ok(())
    }

    /// Whether something is queued or audible, refreshed every few hundred milliseconds.
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_handle_is_silent_and_stop_is_harmless() {
        let playback = PlaybackHandle::new();
        assert!(!playback.is_playing());

        // No thread has been spawned yet; stopping must not start one.
        playback.stop().unwrap();
        assert!(!playback.is_playing());
        assert!(playback.tx.lock().unwrap().is_none());
    }
}
