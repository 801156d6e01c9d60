use bytes::Bytes;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "decode";

/// Decoded mono audio handed to the analysis pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Degenerate inputs (no samples, zero rate) are accepted here and
    /// reported by the pipeline instead.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_samples(self.sample_rate, self.samples.len())
    }
}

#[derive(Clone, Debug)]
pub enum AudioInput {
    Path(PathBuf),
    Bytes {
        data: Bytes,
        /// File extension used as a probe hint, e.g. `wav`.
        extension: Option<String>,
    },
}

impl AudioInput {
    fn extension(&self) -> Option<String> {
        match self {
            Self::Path(p) => p
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase),
            Self::Bytes { extension, .. } => extension.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("failed to open audio: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("corrupt audio data: {0}")]
    Corrupt(String),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("audio stream does not declare a sample rate")]
    UnknownSampleRate,
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Turns an audio file into a mono [`Waveform`].
pub trait WaveformSource: Send + Sync {
    fn decode(&self, input: AudioInput) -> Result<Waveform>;
}

/// Decodes WAV, MP3, FLAC, OGG/Vorbis and M4A/AAC via symphonia.
#[derive(Clone, Debug, Default)]
pub struct SymphoniaWaveformSource;

impl SymphoniaWaveformSource {
    pub fn new() -> Self {
        Self
    }

    fn open(input: &AudioInput) -> Result<Box<dyn MediaSource>> {
        match input {
            AudioInput::Path(path) => Ok(Box::new(File::open(path)?)),
            AudioInput::Bytes { data, .. } => Ok(Box::new(std::io::Cursor::new(data.clone()))),
        }
    }

    fn decode_stream(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Waveform> {
        let mss = MediaSourceStream::new(source, Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(map_symphonia_error)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(map_symphonia_error)?;

        let mut sample_rate = codec_params.sample_rate;
        let mut samples = Vec::new();
        let mut skipped = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(map_symphonia_error(e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if sample_rate.is_none() {
                        sample_rate = Some(spec.rate);
                    }
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    samples.extend(downmix_to_mono(buf.samples(), spec.channels.count()));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    skipped += 1;
                    tracing::warn!(target: LOG_TARGET, reason = msg, "skipping corrupt packet");
                }
                Err(e) => return Err(map_symphonia_error(e)),
            }
        }

        let sample_rate = sample_rate.ok_or(DecodeError::UnknownSampleRate)?;
        tracing::debug!(
            target: LOG_TARGET,
            samples = samples.len(),
            sample_rate,
            skipped,
            "decoded audio"
        );
        Ok(Waveform::new(samples, sample_rate))
    }
}

impl WaveformSource for SymphoniaWaveformSource {
    fn decode(&self, input: AudioInput) -> Result<Waveform> {
        let mut hint = Hint::new();
        if let Some(ext) = input.extension() {
            hint.with_extension(&ext);
        }
        let source = Self::open(&input)?;
        Self::decode_stream(source, &hint)
    }
}

fn map_symphonia_error(e: SymphoniaError) -> DecodeError {
    match e {
        SymphoniaError::IoError(e) => DecodeError::Io(e),
        SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_owned()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}

/// Averages interleaved frames into a single channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

fn duration_from_samples(sample_rate_hz: u32, samples: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(samples as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
