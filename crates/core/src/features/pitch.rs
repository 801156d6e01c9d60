use crate::config::{ConfigError, PitchConfig};
use crate::decode::Waveform;
use crate::features::{check_waveform, rms, FeatureError};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "features::pitch";

/// Aggregate fundamental-frequency statistics over the voiced frames of a
/// recording. `mean_hz` is `None` when no frame was voiced.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PitchProfile {
    pub mean_hz: Option<f32>,
    pub std_hz: Option<f32>,
    pub voiced_fraction: f32,
    pub frame_count: usize,
}

impl PitchProfile {
    pub fn indeterminate(frame_count: usize) -> Self {
        Self {
            mean_hz: None,
            std_hz: None,
            voiced_fraction: 0.0,
            frame_count,
        }
    }

    /// A fully voiced profile with the given mean, for callers that already
    /// know the pitch.
    pub fn measured(mean_hz: f32) -> Self {
        Self {
            mean_hz: Some(mean_hz),
            std_hz: Some(0.0),
            voiced_fraction: 1.0,
            frame_count: 1,
        }
    }

    pub fn from_voiced(voiced_hz: &[f32], frame_count: usize) -> Self {
        if voiced_hz.is_empty() || frame_count == 0 {
            return Self::indeterminate(frame_count);
        }
        let n = voiced_hz.len() as f32;
        let mean = voiced_hz.iter().sum::<f32>() / n;
        let var = voiced_hz.iter().map(|f| (f - mean) * (f - mean)).sum::<f32>() / n;
        Self {
            mean_hz: Some(mean),
            std_hz: Some(var.sqrt()),
            voiced_fraction: voiced_hz.len() as f32 / frame_count as f32,
            frame_count,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.mean_hz.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct FrameEstimate {
    f0_hz: f32,
    confidence: f32,
}

impl FrameEstimate {
    const UNVOICED: Self = Self {
        f0_hz: 0.0,
        confidence: 0.0,
    };
}

/// Frame-wise YIN pitch tracker.
#[derive(Clone, Debug)]
pub struct PitchEstimator {
    config: PitchConfig,
}

impl PitchEstimator {
    pub fn new(config: PitchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    pub fn estimate(&self, waveform: &Waveform) -> Result<PitchProfile, FeatureError> {
        check_waveform(waveform)?;

        let sr = waveform.sample_rate();
        let frame_len = self.config.samples_for(self.config.frame_ms, sr);
        let hop = self.config.samples_for(self.config.hop_ms, sr);
        let min_tau = ((sr as f32 / self.config.max_hz).floor() as usize).max(2);
        let max_tau = ((sr as f32 / self.config.min_hz).ceil() as usize).max(min_tau + 1);

        let mut voiced = Vec::new();
        let mut frame_count = 0usize;
        for frame in frames(waveform.samples(), frame_len, hop) {
            frame_count += 1;
            let est = self.analyze_frame(frame, sr, min_tau, max_tau);
            if est.confidence > self.config.voicing_floor {
                voiced.push(est.f0_hz);
            }
        }

        let profile = PitchProfile::from_voiced(&voiced, frame_count);
        tracing::debug!(
            target: LOG_TARGET,
            frames = frame_count,
            voiced = voiced.len(),
            mean_hz = ?profile.mean_hz,
            "pitch estimated"
        );
        Ok(profile)
    }

    fn analyze_frame(&self, frame: &[f32], sr: u32, min_tau: usize, max_tau: usize) -> FrameEstimate {
        if frame.len() < 2 * max_tau || rms(frame) < self.config.silence_rms {
            return FrameEstimate::UNVOICED;
        }

        let window = frame.len() - max_tau;
        let mut diff = vec![0.0f32; max_tau + 1];
        for (tau, slot) in diff.iter_mut().enumerate().skip(1) {
            *slot = frame[..window]
                .iter()
                .zip(&frame[tau..tau + window])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
        }

        // cumulative mean normalized difference
        let mut cmnd = vec![1.0f32; max_tau + 1];
        let mut running = 0.0f32;
        for tau in 1..=max_tau {
            running += diff[tau];
            if running > 0.0 {
                cmnd[tau] = diff[tau] * tau as f32 / running;
            }
        }

        let threshold = 1.0 - self.config.voicing_floor;
        let tau = match (min_tau..=max_tau).find(|&t| cmnd[t] < threshold) {
            Some(mut t) => {
                while t < max_tau && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                t
            }
            None => (min_tau..=max_tau)
                .min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
                .unwrap_or(min_tau),
        };

        let refined = parabolic_peak(&cmnd, tau);
        if refined <= 0.0 {
            return FrameEstimate::UNVOICED;
        }
        FrameEstimate {
            f0_hz: sr as f32 / refined,
            confidence: (1.0 - cmnd[tau]).clamp(0.0, 1.0),
        }
    }
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self {
            config: PitchConfig::default(),
        }
    }
}

/// Overlapping analysis frames; a recording shorter than one frame is
/// analyzed as a single frame.
fn frames(samples: &[f32], frame_len: usize, hop: usize) -> Vec<&[f32]> {
    if samples.len() <= frame_len {
        return vec![samples];
    }
    (0..=samples.len() - frame_len)
        .step_by(hop)
        .map(|start| &samples[start..start + frame_len])
        .collect()
}

fn parabolic_peak(values: &[f32], idx: usize) -> f32 {
    let t = idx as f32;
    if idx == 0 || idx + 1 >= values.len() {
        return t;
    }
    let (a, b, c) = (values[idx - 1], values[idx], values[idx + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-8 {
        return t;
    }
    t + ((a - c) / (2.0 * denom)).clamp(-1.0, 1.0)
}
