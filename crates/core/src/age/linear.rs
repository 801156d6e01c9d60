use crate::age::{require_pitch, AgeEstimator};
use crate::features::FeatureVector;
use crate::predictor::{bounded_age, PredictorError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Linear regression over the feature vector, with coefficients produced by
/// an offline training run and shipped as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LinearAgeModel {
    pub intercept: f32,
    #[serde(default)]
    pub pitch_mean_hz: f32,
    #[serde(default)]
    pub pitch_variation: f32,
    #[serde(default)]
    pub voiced_fraction: f32,
    #[serde(default)]
    pub rms_energy: f32,
    #[serde(default)]
    pub zero_crossing_rate: f32,
}

impl LinearAgeModel {
    pub fn from_json_str(json: &str) -> Result<Self, PredictorError> {
        let model: Self =
            serde_json::from_str(json).map_err(|e| PredictorError::ModelLoad(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_path(path: &Path) -> Result<Self, PredictorError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PredictorError::ModelLoad(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), PredictorError> {
        let coefficients = [
            self.intercept,
            self.pitch_mean_hz,
            self.pitch_variation,
            self.voiced_fraction,
            self.rms_energy,
            self.zero_crossing_rate,
        ];
        if coefficients.iter().all(|c| c.is_finite()) {
            Ok(())
        } else {
            Err(PredictorError::ModelLoad(
                "model coefficients must be finite".to_owned(),
            ))
        }
    }
}

impl AgeEstimator for LinearAgeModel {
    fn estimate_age(&self, features: &FeatureVector) -> Result<u8, PredictorError> {
        let mean_hz = require_pitch(features)?;
        let estimate = self.intercept
            + self.pitch_mean_hz * mean_hz
            + self.pitch_variation * features.pitch_variation().unwrap_or(0.0)
            + self.voiced_fraction * features.pitch.voiced_fraction
            + self.rms_energy * features.rms_energy
            + self.zero_crossing_rate * features.zero_crossing_rate;
        bounded_age(estimate)
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}
