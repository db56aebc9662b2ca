use std::f32::consts::TAU;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rodio::Source;
use serde::{Deserialize, Serialize};

const SAMPLE_RATE: u32 = 44_100;

/// Background sounds offered for falling asleep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AmbientSound {
    OceanWaves,
    Rain,
    Wind,
    Nature,
}

impl AmbientSound {
    pub const ALL: [AmbientSound; 4] = [
        AmbientSound::OceanWaves,
        AmbientSound::Rain,
        AmbientSound::Wind,
        AmbientSound::Nature,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AmbientSound::OceanWaves => "Ocean Waves",
            AmbientSound::Rain => "Rain",
            AmbientSound::Wind => "Wind",
            AmbientSound::Nature => "Nature",
        }
    }
}

impl FromStr for AmbientSound {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "ocean" | "ocean-waves" => Ok(AmbientSound::OceanWaves),
            "rain" => Ok(AmbientSound::Rain),
            "wind" => Ok(AmbientSound::Wind),
            "nature" => Ok(AmbientSound::Nature),
            other => Err(anyhow!(
                "unknown sound '{other}' (expected ocean, rain, wind or nature)"
            )),
        }
    }
}

/// Endless synthesized loop for one [`AmbientSound`].
///
/// Every kind starts from brown noise (integrated white noise) and shapes it:
/// rain through a band-pass, ocean with a slow swell, wind through a drifting
/// low-pass, nature as a soft bed with occasional chirps.
pub struct AmbientSource {
    kind: AmbientSound,
    rng: StdRng,
    brown: f32,
    // band-pass state
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
    lowpass: f32,
    phase: f32,
    chirp_left: u32,
    chirp_phase: f32,
    chirp_hz: f32,
}

impl AmbientSource {
    pub fn new(kind: AmbientSound) -> Self {
        Self::with_rng(kind, StdRng::from_entropy())
    }

    pub fn seeded(kind: AmbientSound, seed: u64) -> Self {
        Self::with_rng(kind, StdRng::seed_from_u64(seed))
    }

    fn with_rng(kind: AmbientSound, rng: StdRng) -> Self {
        Self {
            kind,
            rng,
            brown: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            lowpass: 0.0,
            phase: 0.0,
            chirp_left: 0,
            chirp_phase: 0.0,
            chirp_hz: 0.0,
        }
    }

    fn white(&mut self) -> f32 {
        self.rng.gen_range(-1.0f32..1.0)
    }

    fn brown_step(&mut self) -> f32 {
        let white = self.white();
        self.brown = ((self.brown + white * 0.02).clamp(-1.0, 1.0)) * 0.9999;
        self.brown
    }

    fn bandpass(&mut self, input: f32) -> f32 {
        let output = 0.1 * input - 0.1 * self.x2 + 1.8 * self.y1 - 0.85 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    /// Advance the slow modulation phase by `hz` cycles per second.
    fn advance_phase(&mut self, hz: f32) -> f32 {
        self.phase += TAU * hz / SAMPLE_RATE as f32;
        if self.phase > TAU {
            self.phase -= TAU;
        }
        self.phase
    }

    fn rain(&mut self) -> f32 {
        let brown = self.brown_step();
        let filtered = self.bandpass(brown);
        let modulation = 0.7 + 0.3 * self.advance_phase(0.05).sin();
        (filtered * 0.8 + brown * 0.2) * modulation * 0.4
    }

    fn ocean(&mut self) -> f32 {
        let brown = self.brown_step();
        // one swell roughly every nine seconds
        let swell = 0.5 + 0.5 * self.advance_phase(0.11).sin();
        brown * (0.15 + 0.6 * swell * swell)
    }

    fn wind(&mut self) -> f32 {
        let white = self.white();
        let gust = 0.5 + 0.5 * self.advance_phase(0.07).sin();
        let alpha = 0.005 + 0.03 * gust;
        self.lowpass += alpha * (white - self.lowpass);
        self.lowpass * (1.5 + 2.0 * gust)
    }

    fn nature(&mut self) -> f32 {
        let bed = self.brown_step() * 0.2;

        if self.chirp_left == 0 && self.rng.gen_bool(1.0 / (SAMPLE_RATE as f64 * 2.0)) {
            self.chirp_left = SAMPLE_RATE / 8;
            self.chirp_hz = self.rng.gen_range(2_500.0f32..4_000.0);
            self.chirp_phase = 0.0;
        }

        let chirp = if self.chirp_left > 0 {
            self.chirp_left -= 1;
            self.chirp_phase += TAU * self.chirp_hz / SAMPLE_RATE as f32;
            if self.chirp_phase > TAU {
                self.chirp_phase -= TAU;
            }
            let envelope = (self.chirp_left as f32 / (SAMPLE_RATE / 8) as f32).min(1.0);
            self.chirp_phase.sin() * envelope * 0.15
        } else {
            0.0
        };

        bed + chirp
    }
}

impl Iterator for AmbientSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = match self.kind {
            AmbientSound::OceanWaves => self.ocean(),
            AmbientSound::Rain => self.rain(),
            AmbientSound::Wind => self.wind(),
            AmbientSound::Nature => self.nature(),
        };
        Some(sample.clamp(-1.0, 1.0))
    }
}

impl Source for AmbientSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn every_sound_is_audible_and_bounded() {
        for kind in AmbientSound::ALL {
            let samples: Vec<f32> = AmbientSource::seeded(kind, 7).take(SAMPLE_RATE as usize).collect();
            assert_eq!(samples.len(), SAMPLE_RATE as usize, "{kind:?} ended early");
            assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)), "{kind:?} clipped");
            assert!(rms(&samples) > 1e-4, "{kind:?} is silent");
        }
    }

    #[test]
    fn sources_loop_forever() {
        let source = AmbientSource::seeded(AmbientSound::Rain, 1);
        assert_eq!(source.total_duration(), None);
        assert_eq!(source.channels(), 1);
    }

    #[test]
    fn ocean_swells_over_seconds() {
        let second = SAMPLE_RATE as usize;
        let samples: Vec<f32> = AmbientSource::seeded(AmbientSound::OceanWaves, 3)
            .take(second * 9)
            .collect();

        let loudness: Vec<f32> = samples.chunks(second).map(rms).collect();
        let loudest = loudness.iter().cloned().fold(f32::MIN, f32::max);
        let quietest = loudness.iter().cloned().fold(f32::MAX, f32::min);
        assert!(loudest > quietest * 1.5, "no swell: {loudness:?}");
    }

    #[test]
    fn parses_sound_names() {
        assert_eq!("ocean".parse::<AmbientSound>().unwrap(), AmbientSound::OceanWaves);
        assert_eq!("Rain".parse::<AmbientSound>().unwrap(), AmbientSound::Rain);
        assert!("thunder".parse::<AmbientSound>().is_err());
        assert_eq!(AmbientSound::Wind.name(), "Wind");
    }
}
