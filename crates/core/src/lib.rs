#![deny(warnings)]

pub mod age;
pub mod config;
pub mod decode;
pub mod emotion;
pub mod features;
pub mod gate;
pub mod pipeline;
pub mod predictor;

pub use decode::Waveform;
pub use pipeline::{AnalysisPipeline, AnalysisResult};
