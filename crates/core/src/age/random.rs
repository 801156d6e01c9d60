use crate::age::AgeEstimator;
use crate::features::FeatureVector;
use crate::predictor::{with_rng, PredictorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::sync::Mutex;

const DEFAULT_RANGE: RangeInclusive<u8> = 18..=84;

/// Draws ages uniformly from its own random source. Only meant as a
/// placeholder predictor; seed it to get a reproducible sequence.
#[derive(Debug)]
pub struct RandomAgeEstimator<R = StdRng> {
    rng: Mutex<R>,
    range: RangeInclusive<u8>,
}

impl<R: Rng> RandomAgeEstimator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
            range: DEFAULT_RANGE,
        }
    }

    pub fn with_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.range = range;
        self
    }
}

impl RandomAgeEstimator<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng + Send> AgeEstimator for RandomAgeEstimator<R> {
    fn estimate_age(&self, _features: &FeatureVector) -> Result<u8, PredictorError> {
        if self.range.is_empty() {
            return Err(PredictorError::Unavailable(format!(
                "empty age range {:?}",
                self.range
            )));
        }
        let range = self.range.clone();
        with_rng(&self.rng, |rng| rng.random_range(range))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
