mod analyzer;
mod random;

use crate::features::FeatureVector;
use crate::predictor::PredictorError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use analyzer::ProsodyEmotionClassifier;
pub use random::RandomEmotionClassifier;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [Self; 4] = [Self::Happy, Self::Sad, Self::Angry, Self::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "Happy",
            Self::Sad => "Sad",
            Self::Angry => "Angry",
            Self::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

/// Maps extracted features to one label of the closed [`EmotionLabel`] set.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> Result<EmotionLabel, PredictorError>;

    fn name(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedEmotionClassifier {
    label: EmotionLabel,
}

impl FixedEmotionClassifier {
    pub fn new(label: EmotionLabel) -> Self {
        Self { label }
    }
}

impl EmotionClassifier for FixedEmotionClassifier {
    fn classify(&self, _features: &FeatureVector) -> Result<EmotionLabel, PredictorError> {
        Ok(self.label)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
