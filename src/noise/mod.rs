pub mod controller;
pub mod device;
pub mod input;
pub mod level;
mod loop_worker;

pub use controller::NoiseMonitor;
pub use device::CpalInput;
pub use input::{AudioInput, CapturedClip, ClipRequest, MicrophoneGuard, MicrophoneHandle};
