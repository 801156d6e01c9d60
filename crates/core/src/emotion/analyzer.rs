use crate::emotion::{EmotionClassifier, EmotionLabel};
use crate::features::FeatureVector;
use crate::predictor::PredictorError;

const LOUD_RMS: f32 = 0.1;
const QUIET_RMS: f32 = 0.03;
const RAISED_PITCH_HZ: f32 = 140.0;
const LOW_PITCH_HZ: f32 = 100.0;
const LIVELY_VARIATION: f32 = 0.1;

/// Rule-based affect from energy, pitch level and pitch movement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProsodyEmotionClassifier;

impl ProsodyEmotionClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl EmotionClassifier for ProsodyEmotionClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<EmotionLabel, PredictorError> {
        let pitch = features.pitch.mean_hz.ok_or_else(|| {
            PredictorError::InvalidFeatures("pitch profile is indeterminate".to_owned())
        })?;
        let variation = features.pitch_variation().unwrap_or(0.0);
        let energy = features.rms_energy;

        let label = if energy >= LOUD_RMS {
            if pitch >= RAISED_PITCH_HZ {
                EmotionLabel::Angry
            } else if variation >= LIVELY_VARIATION {
                EmotionLabel::Happy
            } else {
                EmotionLabel::Neutral
            }
        } else if energy < QUIET_RMS && pitch < LOW_PITCH_HZ {
            EmotionLabel::Sad
        } else {
            EmotionLabel::Neutral
        };

        Ok(label)
    }

    fn name(&self) -> &'static str {
        "prosody"
    }
}
