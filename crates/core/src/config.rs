use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

use crate::predictor::MAX_PLAUSIBLE_AGE;

pub const DEFAULT_GENDER_PITCH_THRESHOLD_HZ: f32 = 165.0;
pub const DEFAULT_SENIOR_AGE_THRESHOLD: u8 = 60;
pub const ENV_GENDER_THRESHOLD_HZ: &str = "VOXGATE_GENDER_THRESHOLD_HZ";
pub const ENV_SENIOR_AGE_THRESHOLD: &str = "VOXGATE_SENIOR_AGE_THRESHOLD";
pub const ENV_AGE_MODEL: &str = "VOXGATE_AGE_MODEL";

/// Mean-pitch boundary above which a voice is rejected by the gender gate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenderThreshold(f32);

impl GenderThreshold {
    pub fn new(hz: f32) -> Result<Self, ConfigError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ConfigError::InvalidGenderThreshold(hz));
        }
        Ok(Self(hz))
    }

    pub fn hz(&self) -> f32 {
        self.0
    }
}

impl Default for GenderThreshold {
    fn default() -> Self {
        Self(DEFAULT_GENDER_PITCH_THRESHOLD_HZ)
    }
}

/// Ages strictly above this value count as senior.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeniorAgeThreshold(u8);

impl SeniorAgeThreshold {
    pub fn new(age: u8) -> Result<Self, ConfigError> {
        if age > MAX_PLAUSIBLE_AGE {
            return Err(ConfigError::InvalidSeniorAge(age));
        }
        Ok(Self(age))
    }

    pub fn years(&self) -> u8 {
        self.0
    }

    pub fn is_senior(&self, age: u8) -> bool {
        age > self.0
    }
}

impl Default for SeniorAgeThreshold {
    fn default() -> Self {
        Self(DEFAULT_SENIOR_AGE_THRESHOLD)
    }
}

/// What the gate does with a recording that has no voiced frames.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndeterminatePolicy {
    #[default]
    Reject,
    Error,
}

impl FromStr for IndeterminatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::UnknownPolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for IndeterminatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Framing and voicing parameters for the pitch tracker.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PitchConfig {
    pub min_hz: f32,
    pub max_hz: f32,
    pub frame_ms: u32,
    pub hop_ms: u32,
    /// Frames whose periodicity confidence does not exceed this are unvoiced.
    pub voicing_floor: f32,
    /// Frames quieter than this RMS are treated as silence.
    pub silence_rms: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_hz: 50.0,
            max_hz: 500.0,
            frame_ms: 64,
            hop_ms: 32,
            voicing_floor: 0.8,
            silence_rms: 1e-3,
        }
    }
}

impl PitchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let band_ok = self.min_hz.is_finite()
            && self.max_hz.is_finite()
            && self.min_hz > 0.0
            && self.min_hz < self.max_hz;
        if !band_ok {
            return Err(ConfigError::InvalidPitchBand {
                min_hz: self.min_hz,
                max_hz: self.max_hz,
            });
        }
        if self.frame_ms == 0 || self.hop_ms == 0 {
            return Err(ConfigError::ZeroFrameDuration);
        }
        if !(self.voicing_floor > 0.0 && self.voicing_floor < 1.0) {
            return Err(ConfigError::InvalidVoicingFloor(self.voicing_floor));
        }
        if !self.silence_rms.is_finite() || self.silence_rms < 0.0 {
            return Err(ConfigError::InvalidSilenceFloor(self.silence_rms));
        }
        Ok(())
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_ms))
    }

    pub fn samples_for(&self, ms: u32, sample_rate_hz: u32) -> usize {
        let n = u64::from(ms).saturating_mul(u64::from(sample_rate_hz)) / 1000;
        usize::try_from(n).unwrap_or(usize::MAX).max(1)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub gender_threshold: GenderThreshold,
    pub senior_age: SeniorAgeThreshold,
    pub indeterminate_policy: IndeterminatePolicy,
    pub pitch: PitchConfig,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        GenderThreshold::new(self.gender_threshold.hz())?;
        SeniorAgeThreshold::new(self.senior_age.years())?;
        self.pitch.validate()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("gender pitch threshold must be a positive finite frequency, got {0}")]
    InvalidGenderThreshold(f32),
    #[error("senior age threshold must be <= 110, got {0}")]
    InvalidSeniorAge(u8),
    #[error("unknown indeterminate-pitch policy: {0:?} (expected `reject` or `error`)")]
    UnknownPolicy(String),
    #[error("pitch band must satisfy 0 < min < max, got {min_hz}..{max_hz} Hz")]
    InvalidPitchBand { min_hz: f32, max_hz: f32 },
    #[error("frame and hop durations must be > 0 ms")]
    ZeroFrameDuration,
    #[error("voicing floor must lie strictly between 0 and 1, got {0}")]
    InvalidVoicingFloor(f32),
    #[error("silence floor must be a non-negative finite rms, got {0}")]
    InvalidSilenceFloor(f32),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// CLI value wins, then the environment, then `default`.
pub fn resolve_parsed<T: FromStr>(
    cli_value: Option<T>,
    env_key: &str,
    env: &impl Env,
    default: T,
) -> Result<T, ConfigError> {
    match cli_value {
        Some(v) => Ok(v),
        None => match env.var(env_key) {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => Err(ConfigError::InvalidValue {
                    key: env_key.to_owned(),
                    value: raw,
                }),
            },
            None => Ok(default),
        },
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}
