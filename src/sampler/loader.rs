// Sample loader - WAV (hound) and FLAC (claxon) files into mono f32 buffers

use claxon::FlacReader;
use hound::{SampleFormat, WavReader};
use std::path::Path;
use thiserror::Error;

/// Sample loading errors
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("FLAC error: {0}")]
    Flac(#[from] claxon::Error),

    #[error("Sample is empty: {0}")]
    Empty(String),
}

pub type SampleResult<T> = Result<T, SampleError>;

/// Mono sample recorded at `root_note`
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub data: Vec<f32>,
    pub sample_rate: u32,
    pub root_note: u8,
}

impl Sample {
    pub fn new(name: impl Into<String>, data: Vec<f32>, sample_rate: u32, root_note: u8) -> Self {
        Self {
            name: name.into(),
            data,
            sample_rate,
            root_note: root_note.min(127),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Load a WAV or FLAC file, picking the decoder from the extension
pub fn load_sample(path: &Path, root_note: u8) -> SampleResult<Sample> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let (data, sample_rate) = match extension.as_str() {
        "wav" => load_wav(path)?,
        "flac" => load_flac(path)?,
        other => return Err(SampleError::UnsupportedFormat(other.to_string())),
    };

    if data.is_empty() {
        return Err(SampleError::Empty(name));
    }

    log::debug!("Loaded sample {} ({} frames @ {} Hz)", name, data.len(), sample_rate);
    Ok(Sample::new(name, data, sample_rate, root_note))
}

fn load_wav(path: &Path) -> SampleResult<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok((downmix(&interleaved, spec.channels as usize), spec.sample_rate))
}

fn load_flac(path: &Path) -> SampleResult<(Vec<f32>, u32)> {
    let mut reader = FlacReader::open(path)?;
    let info = reader.streaminfo();
    let scale = int_scale(info.bits_per_sample);

    let interleaved: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<Result<_, _>>()?;

    Ok((downmix(&interleaved, info.channels as usize), info.sample_rate))
}

fn int_scale(bits: u32) -> f32 {
    (1u64 << (bits.clamp(1, 32) - 1)) as f32
}

/// Average interleaved channels down to mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
