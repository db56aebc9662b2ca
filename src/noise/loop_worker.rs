use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::AudioRecording;
use crate::sleep::{CapturePolicy, TrackingConfig};
use crate::tracker::SharedTrackerState;

use super::input::{ClipRequest, MicrophoneGuard};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// The one clip allowed to be recording at any moment.
struct InFlightCapture {
    recording_id: String,
    detected_at: DateTime<Utc>,
    noise_level: f64,
    deadline: Instant,
}

pub(crate) struct MonitorContext {
    pub session_id: String,
    pub state: SharedTrackerState,
    pub clock: Arc<dyn Clock>,
    pub config: TrackingConfig,
}

/// Sample the microphone every tick until cancelled, capturing one clip per noise event.
///
/// Crossings that happen while a clip is recording are ignored. On cancellation the
/// microphone is handed back so the caller can release it off the async workers.
pub(crate) async fn monitor_loop(
    mut mic: MicrophoneGuard,
    ctx: MonitorContext,
    cancel_token: CancellationToken,
) -> MicrophoneGuard {
    let mut ticker = tokio::time::interval(ctx.config.sample_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut capture: Option<InFlightCapture> = None;

    log_info!(
        "noise monitor started for session {} (threshold {} dB, clip {}s)",
        ctx.session_id,
        ctx.config.noise_threshold_db,
        ctx.config.clip_duration_secs
    );

    loop {
        let deadline = capture
            .as_ref()
            .map(|c| c.deadline)
            .unwrap_or_else(Instant::now);

        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                if let Some(in_flight) = capture.take() {
                    settle_on_stop(&mut mic, &ctx, in_flight).await;
                }
                log_info!("noise monitor shutting down for session {}", ctx.session_id);
                return mic;
            }
            _ = tokio::time::sleep_until(deadline), if capture.is_some() => {
                if let Some(in_flight) = capture.take() {
                    complete_capture(&mut mic, &ctx, in_flight).await;
                }
            }
            _ = ticker.tick() => {
                let level = match mic.sample_level() {
                    Ok(level) => level,
                    Err(err) => {
                        log_warn!("noise sample failed for session {}: {err:?}", ctx.session_id);
                        continue;
                    }
                };

                if level <= ctx.config.noise_threshold_db {
                    continue;
                }

                if capture.is_some() {
                    log_debug!("noise at {level:.1} dB ignored, capture already running");
                    continue;
                }

                capture = begin_capture(&mut mic, &ctx, level);
            }
        }
    }
}

fn begin_capture(
    mic: &mut MicrophoneGuard,
    ctx: &MonitorContext,
    level: f64,
) -> Option<InFlightCapture> {
    let request = ClipRequest {
        session_id: ctx.session_id.clone(),
        recording_id: Uuid::new_v4().to_string(),
    };

    match mic.start_clip(&request) {
        Ok(()) => {
            log_info!("noise detected at {level:.1} dB, capturing clip {}", request.recording_id);
            Some(InFlightCapture {
                recording_id: request.recording_id,
                detected_at: ctx.clock.now(),
                noise_level: level,
                deadline: Instant::now() + ctx.config.clip_duration(),
            })
        }
        Err(err) => {
            log_error!("failed to start noise clip: {err:?}");
            None
        }
    }
}

async fn complete_capture(mic: &mut MicrophoneGuard, ctx: &MonitorContext, in_flight: InFlightCapture) {
    let clip = match mic.finish_clip() {
        Ok(clip) => clip,
        Err(err) => {
            log_error!("failed to finish noise clip {}: {err:?}", in_flight.recording_id);
            return;
        }
    };

    let recording = AudioRecording {
        id: in_flight.recording_id,
        timestamp: in_flight.detected_at,
        uri: clip.uri,
        duration: clip.duration_secs,
        noise_level: Some(in_flight.noise_level),
    };
    let recording_id = recording.id.clone();

    let appended = ctx
        .state
        .lock()
        .await
        .append_recording(&ctx.session_id, recording);

    if appended {
        log_info!("recording {} attached to session {}", recording_id, ctx.session_id);
    } else {
        log_warn!(
            "session {} no longer active, dropping recording {}",
            ctx.session_id,
            recording_id
        );
    }
}

async fn settle_on_stop(mic: &mut MicrophoneGuard, ctx: &MonitorContext, in_flight: InFlightCapture) {
    match ctx.config.in_flight_capture {
        CapturePolicy::Discard => {
            mic.discard_clip();
            log_info!("discarded in-flight clip {} on stop", in_flight.recording_id);
        }
        CapturePolicy::Keep => complete_capture(mic, ctx, in_flight).await,
    }
}
