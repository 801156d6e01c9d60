#![deny(warnings)]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxgate_core::age::{
    AgeEstimator, FixedAgeEstimator, LinearAgeModel, RandomAgeEstimator, RuleBasedAgeEstimator,
};
use voxgate_core::config::{
    resolve_optional_string, resolve_parsed, AnalysisConfig, Env, GenderThreshold,
    IndeterminatePolicy, PitchConfig, SeniorAgeThreshold, StdEnv,
    DEFAULT_GENDER_PITCH_THRESHOLD_HZ, DEFAULT_SENIOR_AGE_THRESHOLD, ENV_AGE_MODEL,
    ENV_GENDER_THRESHOLD_HZ, ENV_SENIOR_AGE_THRESHOLD,
};
use voxgate_core::decode::{AudioInput, SymphoniaWaveformSource, WaveformSource};
use voxgate_core::emotion::{
    EmotionClassifier, EmotionLabel, FixedEmotionClassifier, ProsodyEmotionClassifier,
    RandomEmotionClassifier,
};
use voxgate_core::gate::RejectReason;
use voxgate_core::{AnalysisPipeline, AnalysisResult};

#[derive(Parser, Debug)]
#[command(name = "voxgate")]
#[command(about = "Male-voice gate, age estimate and senior emotion check for a voice recording")]
struct Args {
    /// Recording to analyze (wav, mp3, flac, ogg, m4a).
    file: PathBuf,

    #[arg(long)]
    gender_threshold_hz: Option<f32>,

    #[arg(long)]
    senior_age_threshold: Option<u8>,

    /// What to do when no voiced speech is found: `reject` or `error`.
    #[arg(long, default_value = "reject")]
    indeterminate: IndeterminatePolicy,

    /// `rule`, `random`, `fixed:<years>` or `linear:<model.json>`.
    #[arg(long)]
    age_model: Option<String>,

    /// `prosody`, `random` or `fixed:<Happy|Sad|Angry|Neutral>`.
    #[arg(long, default_value = "prosody")]
    emotion_model: EmotionModelSpec,

    /// Seed for the `random` predictors.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Debug, PartialEq)]
enum AgeModelSpec {
    Rule,
    Random,
    Fixed(u8),
    Linear(PathBuf),
}

impl FromStr for AgeModelSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "rule" => Ok(Self::Rule),
            None if s == "random" => Ok(Self::Random),
            Some(("fixed", years)) => Ok(Self::Fixed(
                years
                    .parse()
                    .with_context(|| format!("invalid fixed age: {years}"))?,
            )),
            Some(("linear", path)) if !path.is_empty() => Ok(Self::Linear(PathBuf::from(path))),
            _ => anyhow::bail!("unknown age model: {s}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum EmotionModelSpec {
    Prosody,
    Random,
    Fixed(EmotionLabel),
}

impl FromStr for EmotionModelSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "prosody" => Ok(Self::Prosody),
            None if s == "random" => Ok(Self::Random),
            Some(("fixed", label)) => Ok(Self::Fixed(label.parse()?)),
            _ => anyhow::bail!("unknown emotion model: {s}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&args, &env)?;
    let age_spec = resolve_age_model(&args, &env)?;
    let age = build_age_estimator(&age_spec, args.seed)?;
    let emotion = build_emotion_classifier(&args.emotion_model, args.seed);

    tracing::info!(
        file = %args.file.display(),
        gender_threshold_hz = cfg.gender_threshold.hz(),
        senior_age_threshold = cfg.senior_age.years(),
        age_model = age.name(),
        emotion_model = emotion.name(),
        "config loaded"
    );

    let pipeline = AnalysisPipeline::new(cfg, age, emotion)?;
    let input = AudioInput::Path(args.file.clone());

    // Decoding and analysis are CPU bound; keep them off the async workers.
    let result = tokio::task::spawn_blocking(move || {
        match SymphoniaWaveformSource::new().decode(input) {
            Ok(waveform) => pipeline.analyze(&waveform),
            Err(e) => AnalysisResult::from_decode_error(e),
        }
    })
    .await
    .context("analysis worker failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result {
            AnalysisResult::Error { .. } => eprintln!("{}", render(&result)),
            _ => println!("{}", render(&result)),
        }
    }

    Ok(match result {
        AnalysisResult::Error { .. } => ExitCode::from(2),
        _ => ExitCode::SUCCESS,
    })
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: &Args, env: &impl Env) -> anyhow::Result<AnalysisConfig> {
    let threshold_hz = resolve_parsed(
        args.gender_threshold_hz,
        ENV_GENDER_THRESHOLD_HZ,
        env,
        DEFAULT_GENDER_PITCH_THRESHOLD_HZ,
    )?;
    let senior_age = resolve_parsed(
        args.senior_age_threshold,
        ENV_SENIOR_AGE_THRESHOLD,
        env,
        DEFAULT_SENIOR_AGE_THRESHOLD,
    )?;

    Ok(AnalysisConfig {
        gender_threshold: GenderThreshold::new(threshold_hz)?,
        senior_age: SeniorAgeThreshold::new(senior_age)?,
        indeterminate_policy: args.indeterminate,
        pitch: PitchConfig::default(),
    })
}

fn resolve_age_model(args: &Args, env: &impl Env) -> anyhow::Result<AgeModelSpec> {
    match resolve_optional_string(args.age_model.clone(), ENV_AGE_MODEL, env) {
        Some(raw) => raw.parse(),
        None => Ok(AgeModelSpec::Rule),
    }
}

fn build_age_estimator(
    spec: &AgeModelSpec,
    seed: Option<u64>,
) -> anyhow::Result<Arc<dyn AgeEstimator>> {
    Ok(match spec {
        AgeModelSpec::Rule => Arc::new(RuleBasedAgeEstimator::new()),
        AgeModelSpec::Fixed(years) => Arc::new(FixedAgeEstimator::new(*years)),
        AgeModelSpec::Random => match seed {
            Some(seed) => Arc::new(RandomAgeEstimator::seeded(seed)),
            None => Arc::new(RandomAgeEstimator::from_os_rng()),
        },
        AgeModelSpec::Linear(path) => Arc::new(
            LinearAgeModel::from_path(path)
                .with_context(|| format!("loading age model {}", path.display()))?,
        ),
    })
}

fn build_emotion_classifier(
    spec: &EmotionModelSpec,
    seed: Option<u64>,
) -> Arc<dyn EmotionClassifier> {
    match spec {
        EmotionModelSpec::Prosody => Arc::new(ProsodyEmotionClassifier::new()),
        EmotionModelSpec::Fixed(label) => Arc::new(FixedEmotionClassifier::new(*label)),
        EmotionModelSpec::Random => match seed {
            Some(seed) => Arc::new(RandomEmotionClassifier::seeded(seed)),
            None => Arc::new(RandomEmotionClassifier::from_os_rng()),
        },
    }
}

fn render(result: &AnalysisResult) -> String {
    match result {
        AnalysisResult::Rejected {
            reason: RejectReason::NonMaleVoice,
        } => "Rejected: non-male voice rejected. Please upload a male voice recording.".to_owned(),
        AnalysisResult::Rejected { reason } => format!("Rejected: {reason}."),
        AnalysisResult::Success {
            age,
            is_senior: false,
            ..
        } => format!("Detected age: {age} years\nSenior citizen: no"),
        AnalysisResult::Success { age, emotion, .. } => {
            let emotion = emotion.map(|e| e.to_string()).unwrap_or_else(|| "-".to_owned());
            format!("Detected age: {age} years\nSenior citizen: yes\nEmotion: {emotion}")
        }
        AnalysisResult::Error { message } => format!("Analysis error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxgate_core::config::MapEnv;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["voxgate", "voice.wav"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn defaults_apply_without_flags_or_env() {
        let cfg = build_config(&args(&[]), &MapEnv::default()).expect("config");
        assert_eq!(cfg.gender_threshold.hz(), 165.0);
        assert_eq!(cfg.senior_age.years(), 60);
        assert_eq!(cfg.indeterminate_policy, IndeterminatePolicy::Reject);
    }

    #[test]
    fn flags_override_env() {
        let env = MapEnv::default()
            .with_var(ENV_GENDER_THRESHOLD_HZ, "190")
            .with_var(ENV_SENIOR_AGE_THRESHOLD, "65");
        let cfg = build_config(&args(&["--gender-threshold-hz", "150"]), &env).expect("config");
        assert_eq!(cfg.gender_threshold.hz(), 150.0);
        assert_eq!(cfg.senior_age.years(), 65);
    }

    #[test]
    fn invalid_threshold_is_refused() {
        assert!(build_config(&args(&["--gender-threshold-hz", "0"]), &MapEnv::default()).is_err());
    }

    #[test]
    fn indeterminate_policy_flag_parses() {
        let a = args(&["--indeterminate", "error"]);
        assert_eq!(a.indeterminate, IndeterminatePolicy::Error);
        assert!(Args::try_parse_from(["voxgate", "voice.wav", "--indeterminate", "accept"]).is_err());
    }

    #[test]
    fn age_model_specs_parse() {
        assert_eq!("rule".parse::<AgeModelSpec>().expect("spec"), AgeModelSpec::Rule);
        assert_eq!("fixed:72".parse::<AgeModelSpec>().expect("spec"), AgeModelSpec::Fixed(72));
        assert_eq!(
            "linear:/models/age.json".parse::<AgeModelSpec>().expect("spec"),
            AgeModelSpec::Linear(PathBuf::from("/models/age.json"))
        );
        assert!("fixed:old".parse::<AgeModelSpec>().is_err());
        assert!("neural".parse::<AgeModelSpec>().is_err());
    }

    #[test]
    fn age_model_falls_back_to_env_then_rule() {
        let env = MapEnv::default().with_var(ENV_AGE_MODEL, "fixed:40");
        assert_eq!(resolve_age_model(&args(&[]), &env).expect("spec"), AgeModelSpec::Fixed(40));
        assert_eq!(
            resolve_age_model(&args(&[]), &MapEnv::default()).expect("spec"),
            AgeModelSpec::Rule
        );
    }

    #[test]
    fn emotion_model_specs_parse() {
        assert_eq!(
            "fixed:neutral".parse::<EmotionModelSpec>().expect("spec"),
            EmotionModelSpec::Fixed(EmotionLabel::Neutral)
        );
        assert_eq!("random".parse::<EmotionModelSpec>().expect("spec"), EmotionModelSpec::Random);
        assert!("fixed:bored".parse::<EmotionModelSpec>().is_err());
    }

    #[test]
    fn renders_each_outcome() {
        assert!(render(&AnalysisResult::Rejected {
            reason: RejectReason::NonMaleVoice,
        })
        .contains("non-male voice rejected"));
        assert_eq!(
            render(&AnalysisResult::Success {
                age: 45,
                is_senior: false,
                emotion: None,
            }),
            "Detected age: 45 years\nSenior citizen: no"
        );
        assert_eq!(
            render(&AnalysisResult::Success {
                age: 75,
                is_senior: true,
                emotion: Some(EmotionLabel::Sad),
            }),
            "Detected age: 75 years\nSenior citizen: yes\nEmotion: Sad"
        );
        assert_eq!(
            render(&AnalysisResult::Error {
                message: "boom".to_owned(),
            }),
            "Analysis error: boom"
        );
    }
}
