//! Pieces shared by the age and emotion predictor capabilities.

use std::sync::Mutex;

/// Upper bound on any age a predictor may report.
pub const MAX_PLAUSIBLE_AGE: u8 = 110;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictorError {
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("invalid feature vector: {0}")]
    InvalidFeatures(String),

    #[error("age estimate {0} is outside the plausible range 0..=110")]
    OutOfRange(i64),

    #[error("failed to load model: {0}")]
    ModelLoad(String),
}

/// Runs `f` against an instance-scoped random source.
pub(crate) fn with_rng<R, T>(
    rng: &Mutex<R>,
    f: impl FnOnce(&mut R) -> T,
) -> Result<T, PredictorError> {
    let mut guard = rng
        .lock()
        .map_err(|_| PredictorError::Unavailable("random source lock poisoned".to_owned()))?;
    Ok(f(&mut guard))
}

/// Rounds a real-valued estimate into the plausible age range.
pub(crate) fn bounded_age(estimate: f32) -> Result<u8, PredictorError> {
    if !estimate.is_finite() {
        return Err(PredictorError::InvalidFeatures(format!(
            "age estimate is not finite: {estimate}"
        )));
    }
    let rounded = estimate.round().clamp(0.0, f32::from(MAX_PLAUSIBLE_AGE));
    Ok(rounded as u8)
}
