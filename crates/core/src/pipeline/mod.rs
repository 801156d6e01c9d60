use crate::age::AgeEstimator;
use crate::config::{AnalysisConfig, ConfigError};
use crate::decode::{DecodeError, Waveform};
use crate::emotion::{EmotionClassifier, EmotionLabel};
use crate::features::{FeatureError, FeatureExtractor};
use crate::gate::{GateDecision, GenderGate, RejectReason};
use crate::predictor::{PredictorError, MAX_PLAUSIBLE_AGE};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LOG_TARGET: &str = "pipeline";

/// Outcome of one analysis. Exactly one case is ever produced, and
/// `emotion` is present exactly when `is_senior` is true.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResult {
    Rejected {
        reason: RejectReason,
    },
    Success {
        age: u8,
        is_senior: bool,
        emotion: Option<EmotionLabel>,
    },
    Error {
        message: String,
    },
}

impl AnalysisResult {
    /// Folds a failure of the decoding collaborator into the result contract.
    pub fn from_decode_error(err: DecodeError) -> Self {
        AnalysisError::Decode(err).into()
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }
}

impl From<AnalysisError> for AnalysisResult {
    fn from(err: AnalysisError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Age,
    Emotion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Age => f.write_str("age"),
            Self::Emotion => f.write_str("emotion"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("degenerate input: {0}")]
    DegenerateInput(#[from] FeatureError),

    #[error("degenerate input: no voiced frames detected")]
    Indeterminate,

    #[error("{stage} predictor `{name}` failed: {source}")]
    Predictor {
        stage: Stage,
        name: &'static str,
        source: PredictorError,
    },

    #[error("could not decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("analysis panicked: {0}")]
    Panicked(String),
}

/// Pitch extraction, gender gate, age estimation and, for seniors, emotion
/// classification. Holds no per-call state, so one instance can serve many
/// threads.
#[derive(Clone)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    extractor: FeatureExtractor,
    gate: GenderGate,
    age: Arc<dyn AgeEstimator>,
    emotion: Arc<dyn EmotionClassifier>,
}

impl fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("config", &self.config)
            .field("age", &self.age.name())
            .field("emotion", &self.emotion.name())
            .finish()
    }
}

impl AnalysisPipeline {
    pub fn new(
        config: AnalysisConfig,
        age: Arc<dyn AgeEstimator>,
        emotion: Arc<dyn EmotionClassifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new(config.pitch)?,
            gate: GenderGate::new(config.gender_threshold, config.indeterminate_policy),
            config,
            age,
            emotion,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, waveform: &Waveform) -> AnalysisResult {
        self.analyze_cancellable(waveform, &AtomicBool::new(false))
    }

    /// Like [`analyze`](Self::analyze), but gives up between stages once
    /// `cancel` is set.
    pub fn analyze_cancellable(&self, waveform: &Waveform, cancel: &AtomicBool) -> AnalysisResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(waveform, cancel)))
            .unwrap_or_else(|payload| Err(AnalysisError::Panicked(panic_message(&*payload))));

        match outcome {
            Ok(result) => {
                tracing::info!(target: LOG_TARGET, status = result.status(), "analysis finished");
                result
            }
            Err(err) => {
                tracing::warn!(target: LOG_TARGET, error = %err, "analysis failed");
                err.into()
            }
        }
    }

    fn run(&self, waveform: &Waveform, cancel: &AtomicBool) -> Result<AnalysisResult, AnalysisError> {
        let features = self.extractor.extract(waveform)?;
        tracing::debug!(
            target: LOG_TARGET,
            mean_hz = ?features.pitch.mean_hz,
            voiced_fraction = features.pitch.voiced_fraction,
            rms = features.rms_energy,
            "features extracted"
        );
        checkpoint(cancel)?;

        match self.gate.evaluate(&features.pitch) {
            GateDecision::Reject(reason) => {
                tracing::debug!(target: LOG_TARGET, %reason, "gate rejected input");
                return Ok(AnalysisResult::Rejected { reason });
            }
            GateDecision::Indeterminate => return Err(AnalysisError::Indeterminate),
            GateDecision::Accept { pitch_hz } => {
                tracing::debug!(target: LOG_TARGET, pitch_hz, "gate accepted input");
            }
        }
        checkpoint(cancel)?;

        let age = self
            .age
            .estimate_age(&features)
            .and_then(|age| {
                if age > MAX_PLAUSIBLE_AGE {
                    Err(PredictorError::OutOfRange(i64::from(age)))
                } else {
                    Ok(age)
                }
            })
            .map_err(|source| AnalysisError::Predictor {
                stage: Stage::Age,
                name: self.age.name(),
                source,
            })?;
        let is_senior = self.config.senior_age.is_senior(age);
        tracing::debug!(target: LOG_TARGET, age, is_senior, "age estimated");

        if !is_senior {
            return Ok(AnalysisResult::Success {
                age,
                is_senior,
                emotion: None,
            });
        }
        checkpoint(cancel)?;

        let emotion = self
            .emotion
            .classify(&features)
            .map_err(|source| AnalysisError::Predictor {
                stage: Stage::Emotion,
                name: self.emotion.name(),
                source,
            })?;
        tracing::debug!(target: LOG_TARGET, %emotion, "emotion classified");

        Ok(AnalysisResult::Success {
            age,
            is_senior,
            emotion: Some(emotion),
        })
    }
}

fn checkpoint(cancel: &AtomicBool) -> Result<(), AnalysisError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(AnalysisError::Cancelled);
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::age::{FixedAgeEstimator, RuleBasedAgeEstimator};
    use crate::config::{GenderThreshold, IndeterminatePolicy, SeniorAgeThreshold};
    use crate::emotion::{FixedEmotionClassifier, ProsodyEmotionClassifier};
    use crate::features::test_signals::sine;
    use crate::features::FeatureVector;
    use std::sync::atomic::AtomicUsize;

    struct FailingAge;

    impl AgeEstimator for FailingAge {
        fn estimate_age(&self, _: &FeatureVector) -> Result<u8, PredictorError> {
            Err(PredictorError::Unavailable("model not loaded".to_owned()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct PanickingAge;

    impl AgeEstimator for PanickingAge {
        fn estimate_age(&self, _: &FeatureVector) -> Result<u8, PredictorError> {
            panic!("weights corrupted")
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[derive(Default)]
    struct CountingEmotion {
        calls: AtomicUsize,
    }

    impl EmotionClassifier for CountingEmotion {
        fn classify(&self, _: &FeatureVector) -> Result<EmotionLabel, PredictorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmotionLabel::Happy)
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn pipeline_with(age: Arc<dyn AgeEstimator>, emotion: Arc<dyn EmotionClassifier>) -> AnalysisPipeline {
        AnalysisPipeline::new(AnalysisConfig::default(), age, emotion).expect("valid config")
    }

    fn fixed(age: u8, label: EmotionLabel) -> AnalysisPipeline {
        pipeline_with(
            Arc::new(FixedAgeEstimator::new(age)),
            Arc::new(FixedEmotionClassifier::new(label)),
        )
    }

    #[test]
    fn adult_male_gets_age_without_emotion() {
        let result = fixed(45, EmotionLabel::Happy).analyze(&sine(120.0, 16_000, 1.0, 0.5));
        assert_eq!(
            result,
            AnalysisResult::Success {
                age: 45,
                is_senior: false,
                emotion: None,
            }
        );
    }

    #[test]
    fn high_pitched_voice_is_rejected() {
        let result = fixed(45, EmotionLabel::Happy).analyze(&sine(200.0, 16_000, 1.0, 0.5));
        assert_eq!(
            result,
            AnalysisResult::Rejected {
                reason: RejectReason::NonMaleVoice,
            }
        );
        if let AnalysisResult::Rejected { reason } = result {
            assert_eq!(reason.to_string(), "non-male voice rejected");
        }
    }

    #[test]
    fn senior_male_gets_emotion() {
        let result = fixed(75, EmotionLabel::Neutral).analyze(&sine(100.0, 16_000, 1.0, 0.5));
        assert_eq!(
            result,
            AnalysisResult::Success {
                age: 75,
                is_senior: true,
                emotion: Some(EmotionLabel::Neutral),
            }
        );
    }

    #[test]
    fn failing_age_estimator_yields_error() {
        let p = pipeline_with(
            Arc::new(FailingAge),
            Arc::new(FixedEmotionClassifier::new(EmotionLabel::Neutral)),
        );
        match p.analyze(&sine(120.0, 16_000, 1.0, 0.5)) {
            AnalysisResult::Error { message } => {
                assert!(message.contains("age predictor `failing` failed"), "{message}");
                assert!(message.contains("model not loaded"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn panicking_predictor_is_contained() {
        let p = pipeline_with(
            Arc::new(PanickingAge),
            Arc::new(FixedEmotionClassifier::new(EmotionLabel::Neutral)),
        );
        match p.analyze(&sine(120.0, 16_000, 1.0, 0.5)) {
            AnalysisResult::Error { message } => assert!(message.contains("weights corrupted")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn empty_or_rateless_waveform_is_error() {
        let p = fixed(45, EmotionLabel::Happy);
        assert!(matches!(
            p.analyze(&Waveform::new(Vec::new(), 16_000)),
            AnalysisResult::Error { .. }
        ));
        assert!(matches!(
            p.analyze(&Waveform::new(vec![0.2; 1000], 0)),
            AnalysisResult::Error { .. }
        ));
    }

    #[test]
    fn silence_follows_indeterminate_policy() {
        let silence = Waveform::new(vec![0.0; 16_000], 16_000);
        assert_eq!(
            fixed(45, EmotionLabel::Happy).analyze(&silence),
            AnalysisResult::Rejected {
                reason: RejectReason::InsufficientSignal,
            }
        );

        let config = AnalysisConfig {
            indeterminate_policy: IndeterminatePolicy::Error,
            ..AnalysisConfig::default()
        };
        let p = AnalysisPipeline::new(
            config,
            Arc::new(FixedAgeEstimator::new(45)),
            Arc::new(FixedEmotionClassifier::new(EmotionLabel::Happy)),
        )
        .expect("valid");
        match p.analyze(&silence) {
            AnalysisResult::Error { message } => assert!(message.contains("no voiced frames")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn seniority_follows_configured_threshold() {
        let voice = sine(110.0, 16_000, 0.5, 0.5);
        let threshold = SeniorAgeThreshold::new(70).expect("valid");
        for age in (0..=MAX_PLAUSIBLE_AGE).step_by(5) {
            let config = AnalysisConfig {
                senior_age: threshold,
                ..AnalysisConfig::default()
            };
            let p = AnalysisPipeline::new(
                config,
                Arc::new(FixedAgeEstimator::new(age)),
                Arc::new(FixedEmotionClassifier::new(EmotionLabel::Sad)),
            )
            .expect("valid");
            match p.analyze(&voice) {
                AnalysisResult::Success {
                    age: got,
                    is_senior,
                    emotion,
                } => {
                    assert_eq!(got, age);
                    assert_eq!(is_senior, age > 70);
                    assert_eq!(emotion.is_some(), is_senior);
                }
                other => panic!("expected success, got {other:?}"),
            }
        }
    }

    #[test]
    fn emotion_classifier_only_runs_for_seniors() {
        let counter = Arc::new(CountingEmotion::default());
        let voice = sine(120.0, 16_000, 0.5, 0.5);

        let p = pipeline_with(Arc::new(FixedAgeEstimator::new(60)), counter.clone());
        assert!(matches!(
            p.analyze(&voice),
            AnalysisResult::Success { emotion: None, .. }
        ));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);

        let p = pipeline_with(Arc::new(FixedAgeEstimator::new(61)), counter.clone());
        assert!(matches!(
            p.analyze(&voice),
            AnalysisResult::Success {
                emotion: Some(EmotionLabel::Happy),
                ..
            }
        ));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn out_of_range_age_is_error() {
        let p = fixed(200, EmotionLabel::Happy);
        match p.analyze(&sine(120.0, 16_000, 0.5, 0.5)) {
            AnalysisResult::Error { message } => assert!(message.contains("plausible range")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let p = pipeline_with(
            Arc::new(RuleBasedAgeEstimator::new()),
            Arc::new(ProsodyEmotionClassifier::new()),
        );
        let voice = sine(95.0, 16_000, 1.0, 0.05);
        let first = p.analyze(&voice);
        assert!(matches!(first, AnalysisResult::Success { .. }));
        for _ in 0..3 {
            assert_eq!(p.analyze(&voice), first);
        }
    }

    #[test]
    fn concurrent_invocations_are_independent() {
        let p = Arc::new(fixed(75, EmotionLabel::Angry));
        let handles: Vec<_> = [100.0f32, 130.0, 220.0]
            .into_iter()
            .map(|hz| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || p.analyze(&sine(hz, 16_000, 0.5, 0.5)))
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();
        assert_eq!(results[0], results[1]);
        assert_eq!(
            results[2],
            AnalysisResult::Rejected {
                reason: RejectReason::NonMaleVoice,
            }
        );
    }

    #[test]
    fn cancellation_is_observed_between_stages() {
        let cancel = AtomicBool::new(true);
        let result = fixed(45, EmotionLabel::Happy)
            .analyze_cancellable(&sine(120.0, 16_000, 0.5, 0.5), &cancel);
        assert_eq!(
            result,
            AnalysisResult::Error {
                message: "analysis cancelled".to_owned(),
            }
        );
    }

    #[test]
    fn custom_gender_threshold_is_honoured() {
        let config = AnalysisConfig {
            gender_threshold: GenderThreshold::new(250.0).expect("valid"),
            ..AnalysisConfig::default()
        };
        let p = AnalysisPipeline::new(
            config,
            Arc::new(FixedAgeEstimator::new(30)),
            Arc::new(FixedEmotionClassifier::new(EmotionLabel::Happy)),
        )
        .expect("valid");
        assert!(matches!(
            p.analyze(&sine(200.0, 16_000, 0.5, 0.5)),
            AnalysisResult::Success { age: 30, .. }
        ));
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = AnalysisConfig {
            pitch: crate::config::PitchConfig {
                frame_ms: 0,
                ..Default::default()
            },
            ..AnalysisConfig::default()
        };
        let err = AnalysisPipeline::new(
            config,
            Arc::new(FixedAgeEstimator::new(30)),
            Arc::new(FixedEmotionClassifier::new(EmotionLabel::Happy)),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroFrameDuration);
    }

    #[test]
    fn results_serialize_with_status_tag() {
        let success = AnalysisResult::Success {
            age: 75,
            is_senior: true,
            emotion: Some(EmotionLabel::Neutral),
        };
        assert_eq!(
            serde_json::to_value(&success).expect("serialize"),
            serde_json::json!({
                "status": "success",
                "age": 75,
                "is_senior": true,
                "emotion": "Neutral"
            })
        );

        let rejected = AnalysisResult::Rejected {
            reason: RejectReason::NonMaleVoice,
        };
        assert_eq!(
            serde_json::to_value(&rejected).expect("serialize"),
            serde_json::json!({ "status": "rejected", "reason": "non_male_voice" })
        );
    }

    #[test]
    fn decode_errors_fold_into_error_result() {
        let result = AnalysisResult::from_decode_error(DecodeError::NoAudioTrack);
        assert_eq!(result.status(), "error");
        assert_eq!(
            result,
            AnalysisResult::Error {
                message: "could not decode audio: no decodable audio track".to_owned(),
            }
        );
    }
}
