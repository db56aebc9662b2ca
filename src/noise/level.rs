/// Top of the normalized amplitude scale used for level readings.
pub const FULL_SCALE: f64 = 255.0;
/// Reported for a window with no signal at all, where the log would be -inf.
pub const SILENCE_DB: f64 = -160.0;

/// Convert an average amplitude on the 0-255 scale to decibels relative to full scale.
pub fn amplitude_to_db(average: f64) -> f64 {
    if !(average > 0.0) {
        return SILENCE_DB;
    }
    20.0 * (average.min(FULL_SCALE) / FULL_SCALE).log10()
}

/// Running |amplitude| accumulator filled by the audio callback and drained per sample tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct LevelWindow {
    sum: f64,
    count: u64,
}

impl LevelWindow {
    pub fn push(&mut self, sample: f32) {
        self.sum += f64::from(sample.abs().min(1.0));
        self.count += 1;
    }

    /// Level of everything pushed since the last call, then reset.
    pub fn take_db(&mut self) -> f64 {
        let db = if self.count == 0 {
            SILENCE_DB
        } else {
            amplitude_to_db(self.sum / self.count as f64 * FULL_SCALE)
        };
        *self = Self::default();
        db
    }
}
