use crate::emotion::{EmotionClassifier, EmotionLabel};
use crate::features::FeatureVector;
use crate::predictor::{with_rng, PredictorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Picks a label uniformly from its own random source.
#[derive(Debug)]
pub struct RandomEmotionClassifier<R = StdRng> {
    rng: Mutex<R>,
}

impl<R: Rng> RandomEmotionClassifier<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl RandomEmotionClassifier<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng + Send> EmotionClassifier for RandomEmotionClassifier<R> {
    fn classify(&self, _features: &FeatureVector) -> Result<EmotionLabel, PredictorError> {
        with_rng(&self.rng, |rng| {
            EmotionLabel::ALL[rng.random_range(0..EmotionLabel::ALL.len())]
        })
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
