mod pitch;

use crate::config::{ConfigError, PitchConfig};
use crate::decode::Waveform;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use pitch::{PitchEstimator, PitchProfile};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("waveform contains no samples")]
    EmptyWaveform,

    #[error("waveform sample rate is zero")]
    ZeroSampleRate,

    #[error("waveform sample {index} is not finite")]
    NonFiniteSample { index: usize },
}

/// Everything the predictors get to see of a recording.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub pitch: PitchProfile,
    pub rms_energy: f32,
    pub zero_crossing_rate: f32,
    pub duration: Duration,
}

impl FeatureVector {
    /// Pitch standard deviation relative to the mean (a jitter proxy).
    pub fn pitch_variation(&self) -> Option<f32> {
        match (self.pitch.mean_hz, self.pitch.std_hz) {
            (Some(mean), Some(std)) if mean > 0.0 => Some(std / mean),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FeatureExtractor {
    pitch: PitchEstimator,
}

impl FeatureExtractor {
    pub fn new(config: PitchConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pitch: PitchEstimator::new(config)?,
        })
    }

    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector, FeatureError> {
        let pitch = self.pitch.estimate(waveform)?;
        let samples = waveform.samples();
        Ok(FeatureVector {
            pitch,
            rms_energy: rms(samples),
            zero_crossing_rate: zero_crossing_rate(samples),
            duration: waveform.duration(),
        })
    }
}

pub(crate) fn check_waveform(waveform: &Waveform) -> Result<(), FeatureError> {
    if waveform.is_empty() {
        return Err(FeatureError::EmptyWaveform);
    }
    if waveform.sample_rate() == 0 {
        return Err(FeatureError::ZeroSampleRate);
    }
    if let Some(index) = waveform.samples().iter().position(|s| !s.is_finite()) {
        return Err(FeatureError::NonFiniteSample { index });
    }
    Ok(())
}

pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}
