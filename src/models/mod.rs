pub mod session;

pub use session::{AudioRecording, SleepSession, WakeTimeOption};
