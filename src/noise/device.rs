use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use hound::{WavSpec, WavWriter};

use super::input::{AudioInput, CapturedClip, ClipRequest, MicrophoneHandle};
use super::level::LevelWindow;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Default system microphone; clips land in `<recordings_dir>/<session>/<recording>.wav`.
#[derive(Debug, Clone)]
pub struct CpalInput {
    recordings_dir: PathBuf,
}

impl CpalInput {
    pub fn new(recordings_dir: PathBuf) -> Self {
        Self { recordings_dir }
    }
}

impl AudioInput for CpalInput {
    fn acquire(&self) -> Result<Box<dyn MicrophoneHandle>> {
        let mic = CpalMicrophone::open(self.recordings_dir.clone())?;
        Ok(Box::new(mic))
    }
}

struct OpenClip {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
    samples_written: u64,
}

#[derive(Default)]
struct SharedInput {
    level: Mutex<LevelWindow>,
    clip: Mutex<Option<OpenClip>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SharedInput {
    /// Called from the audio callback with samples normalized to -1.0..=1.0.
    fn ingest(&self, samples: impl Iterator<Item = f32> + Clone) {
        {
            let mut level = lock(&self.level);
            for sample in samples.clone() {
                level.push(sample);
            }
        }

        let mut clip = lock(&self.clip);
        if let Some(open) = clip.as_mut() {
            for sample in samples {
                let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                if let Err(err) = open.writer.write_sample(pcm) {
                    log_warn!("dropping clip sample: {err}");
                    break;
                }
                open.samples_written += 1;
            }
        }
    }
}

/// cpal stream plus WAV clip writer.
///
/// The cpal `Stream` is not `Send`, so it lives on a dedicated thread for as long
/// as the handle is held; `release` signals that thread and joins it.
pub struct CpalMicrophone {
    shared: Arc<SharedInput>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
    recordings_dir: PathBuf,
}

impl CpalMicrophone {
    pub fn open(recordings_dir: PathBuf) -> Result<Self> {
        let shared = Arc::new(SharedInput::default());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16)>>();
        let shared_for_thread = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name("sleeptrack-mic".into())
            .spawn(move || {
                let stream = match build_stream(shared_for_thread) {
                    Ok((stream, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                // Either an explicit shutdown or the handle being dropped ends the stream.
                let _ = shutdown_rx.recv();
                drop(stream);
                log_info!("microphone stream closed");
            })
            .context("failed to spawn microphone thread")?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .context("microphone thread exited before signaling readiness")??;

        log_info!("microphone opened ({sample_rate} Hz, {channels} ch)");

        Ok(Self {
            shared,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
            sample_rate,
            channels,
            recordings_dir,
        })
    }

    fn take_clip(&mut self) -> Option<OpenClip> {
        lock(&self.shared.clip).take()
    }
}

fn build_stream(shared: Arc<SharedInput>) -> Result<(cpal::Stream, (u32, u16))> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;
    let supported = device
        .default_input_config()
        .context("failed to read default input config")?;

    let format = (supported.sample_rate().0, supported.channels());
    let config: cpal::StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => open_input::<f32>(&device, &config, shared, |s| s)?,
        SampleFormat::I16 => open_input::<i16>(&device, &config, shared, normalize_i16)?,
        SampleFormat::U16 => open_input::<u16>(&device, &config, shared, normalize_u16)?,
        other => bail!("unsupported input sample format {other:?}"),
    };

    stream.play().context("failed to start input stream")?;
    Ok((stream, format))
}

fn normalize_i16(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

fn normalize_u16(sample: u16) -> f32 {
    (f32::from(sample) - 32_768.0) / 32_768.0
}

fn open_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<SharedInput>,
    normalize: fn(T) -> f32,
) -> Result<cpal::Stream>
where
    T: SizedSample + 'static,
{
    let data_fn = move |data: &[T], _: &cpal::InputCallbackInfo| {
        shared.ingest(data.iter().map(|&sample| normalize(sample)));
    };
    let err_fn = |err: cpal::StreamError| log_error!("input stream error: {err}");

    device
        .build_input_stream(config, data_fn, err_fn, None)
        .context("failed to build input stream")
}

impl MicrophoneHandle for CpalMicrophone {
    fn sample_level(&mut self) -> Result<f64> {
        Ok(lock(&self.shared.level).take_db())
    }

    fn start_clip(&mut self, request: &ClipRequest) -> Result<()> {
        let dir = self.recordings_dir.join(&request.session_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create recordings directory {}", dir.display()))?;

        let path = dir.join(format!("{}.wav", request.recording_id));
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)
            .with_context(|| format!("failed to create clip {}", path.display()))?;

        let mut clip = lock(&self.shared.clip);
        if clip.is_some() {
            bail!("a clip is already being captured");
        }
        *clip = Some(OpenClip {
            writer,
            path,
            samples_written: 0,
        });
        Ok(())
    }

    fn finish_clip(&mut self) -> Result<CapturedClip> {
        let open = self
            .take_clip()
            .ok_or_else(|| anyhow!("no clip is being captured"))?;

        let samples_per_sec = f64::from(self.sample_rate) * f64::from(self.channels.max(1));
        let duration_secs = open.samples_written as f64 / samples_per_sec;

        open.writer
            .finalize()
            .with_context(|| format!("failed to finalize clip {}", open.path.display()))?;

        Ok(CapturedClip {
            uri: open.path.display().to_string(),
            duration_secs,
        })
    }

    fn discard_clip(&mut self) {
        let Some(open) = self.take_clip() else {
            return;
        };
        if let Err(err) = open.writer.finalize() {
            log_warn!("failed to close discarded clip: {err}");
        }
        if let Err(err) = fs::remove_file(&open.path) {
            log_warn!("failed to remove discarded clip {}: {err}", open.path.display());
        }
    }

    /// Blocks until the stream thread has dropped the cpal stream; the monitor
    /// calls this from the blocking pool.
    fn release(&mut self) {
        self.discard_clip();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log_error!("microphone thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_formats_normalize_to_unit_range() {
        assert_eq!(normalize_i16(0), 0.0);
        assert_eq!(normalize_i16(i16::MAX), 1.0);
        assert!(normalize_i16(i16::MIN) <= -1.0);

        assert_eq!(normalize_u16(32_768), 0.0);
        assert_eq!(normalize_u16(0), -1.0);
        assert!((normalize_u16(u16::MAX) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn ingest_feeds_level_without_an_open_clip() {
        let shared = SharedInput::default();
        shared.ingest([1.0_f32, -1.0].into_iter());
        assert!(lock(&shared.level).take_db().abs() < 1e-9);
        assert!(lock(&shared.clip).is_none());
    }
}
