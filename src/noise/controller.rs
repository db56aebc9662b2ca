use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::sleep::TrackingConfig;
use crate::tracker::SharedTrackerState;

use super::input::{AudioInput, MicrophoneGuard};
use super::loop_worker::{monitor_loop, MonitorContext};

/// Owns the sampling task for the active session, if any.
pub struct NoiseMonitor {
    handle: Option<JoinHandle<MicrophoneGuard>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for NoiseMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseMonitor {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Acquire the microphone and start sampling for `session_id`.
    ///
    /// Fails without spawning anything when the device cannot be acquired.
    pub async fn start(
        &mut self,
        session_id: String,
        input: Arc<dyn AudioInput>,
        state: SharedTrackerState,
        clock: Arc<dyn Clock>,
        config: TrackingConfig,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("noise monitor already active");
        }

        // Opening a device can block on the platform audio service.
        let handle = tokio::task::spawn_blocking(move || input.acquire())
            .await
            .map_err(|err| anyhow!("microphone acquire worker join failed: {err}"))?
            .context("failed to acquire microphone")?;
        let mic = MicrophoneGuard::new(handle);

        let cancel_token = CancellationToken::new();
        let ctx = MonitorContext {
            session_id,
            state,
            clock,
            config,
        };

        let join = tokio::spawn(monitor_loop(mic, ctx, cancel_token.clone()));

        self.handle = Some(join);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel sampling, settle any in-flight clip and wait until the microphone is released.
    ///
    /// If the task panicked instead, the guard was already dropped during unwinding.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            let mic = handle
                .await
                .context("noise monitor task failed to join")?;

            // Releasing joins the device thread.
            tokio::task::spawn_blocking(move || drop(mic))
                .await
                .context("microphone release worker failed to join")?;
            info!("noise monitor stopped");
        }
        Ok(())
    }
}
