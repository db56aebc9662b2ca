use anyhow::Result;

/// Source of microphone handles; the seam between the monitor and the platform audio API.
pub trait AudioInput: Send + Sync {
    /// Open the microphone for exclusive use by one monitoring run.
    fn acquire(&self) -> Result<Box<dyn MicrophoneHandle>>;
}

/// Identifies the clip being captured so the handle can decide where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRequest {
    pub session_id: String,
    pub recording_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedClip {
    pub uri: String,
    pub duration_secs: f64,
}

/// A live, exclusively owned microphone.
///
/// At most one clip is open at a time; `start_clip` is only called when the
/// previous clip was finished or discarded.
pub trait MicrophoneHandle: Send {
    /// Current input level in dBFS.
    fn sample_level(&mut self) -> Result<f64>;

    fn start_clip(&mut self, request: &ClipRequest) -> Result<()>;

    /// Close the open clip and hand back where it was stored.
    fn finish_clip(&mut self) -> Result<CapturedClip>;

    /// Abort the open clip and drop whatever it captured.
    fn discard_clip(&mut self);

    /// Give the device back. Called exactly once, by [`MicrophoneGuard`].
    fn release(&mut self);
}

/// Owns a [`MicrophoneHandle`] and releases it when dropped, on every exit path.
pub struct MicrophoneGuard {
    handle: Box<dyn MicrophoneHandle>,
}

impl MicrophoneGuard {
    pub fn new(handle: Box<dyn MicrophoneHandle>) -> Self {
        Self { handle }
    }

    pub fn sample_level(&mut self) -> Result<f64> {
        self.handle.sample_level()
    }

    pub fn start_clip(&mut self, request: &ClipRequest) -> Result<()> {
        self.handle.start_clip(request)
    }

    pub fn finish_clip(&mut self) -> Result<CapturedClip> {
        self.handle.finish_clip()
    }

    pub fn discard_clip(&mut self) {
        self.handle.discard_clip()
    }
}

impl Drop for MicrophoneGuard {
    fn drop(&mut self) {
        self.handle.release();
    }
}
