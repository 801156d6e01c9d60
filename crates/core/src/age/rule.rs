use crate::age::{require_pitch, AgeEstimator};
use crate::features::FeatureVector;
use crate::predictor::{bounded_age, PredictorError};

const BASE_AGE: f32 = 25.0;
const REFERENCE_PITCH_HZ: f32 = 110.0;

/// Hand-tuned heuristic: pitch jitter, breathiness (unvoiced share) and a
/// quiet delivery all push the estimate up, as does a raised mean pitch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuleBasedAgeEstimator;

impl RuleBasedAgeEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl AgeEstimator for RuleBasedAgeEstimator {
    fn estimate_age(&self, features: &FeatureVector) -> Result<u8, PredictorError> {
        let mean_hz = require_pitch(features)?;
        let variation = features.pitch_variation().unwrap_or(0.0).clamp(0.0, 0.25);
        let unvoiced = (1.0 - features.pitch.voiced_fraction).clamp(0.0, 1.0);
        let quietness = (0.1 - features.rms_energy).clamp(0.0, 0.1) * 100.0;

        let estimate = BASE_AGE
            + 160.0 * variation
            + 30.0 * unvoiced
            + 2.0 * quietness
            + 0.2 * (mean_hz - REFERENCE_PITCH_HZ);
        bounded_age(estimate)
    }

    fn name(&self) -> &'static str {
        "rule"
    }
}
