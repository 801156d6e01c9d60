mod linear;
mod random;
mod rule;

use crate::features::FeatureVector;
use crate::predictor::PredictorError;

pub use linear::LinearAgeModel;
pub use random::RandomAgeEstimator;
pub use rule::RuleBasedAgeEstimator;

/// Maps extracted features to an age in years.
pub trait AgeEstimator: Send + Sync {
    fn estimate_age(&self, features: &FeatureVector) -> Result<u8, PredictorError>;

    fn name(&self) -> &'static str;
}

/// Always answers with the same age.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedAgeEstimator {
    age: u8,
}

impl FixedAgeEstimator {
    pub fn new(age: u8) -> Self {
        Self { age }
    }
}

impl AgeEstimator for FixedAgeEstimator {
    fn estimate_age(&self, _features: &FeatureVector) -> Result<u8, PredictorError> {
        Ok(self.age)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub(crate) fn require_pitch(features: &FeatureVector) -> Result<f32, PredictorError> {
    features.pitch.mean_hz.ok_or_else(|| {
        PredictorError::InvalidFeatures("pitch profile is indeterminate".to_owned())
    })
}
