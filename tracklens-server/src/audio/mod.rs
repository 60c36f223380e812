//! Audio input pipeline: decoding, resampling, fixed-length normalization
//! and the mel front-end used by the classifier.

pub mod decoder;
pub mod mel;
pub mod normalizer;
pub mod resampler;

pub use decoder::{decode_audio_file, DecodedAudio};
pub use mel::{MelConfig, MelSpectrogram};
pub use normalizer::{AudioNormalizer, AudioSignal};
pub use resampler::resample_mono;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Audio pipeline errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// File could not be parsed as audio (corrupt, unsupported codec,
    /// zero-length). Not retryable for the same file.
    #[error("Failed to decode audio file {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// Sample rate conversion failed
    #[error("Resampling failed: {0}")]
    Resample(String),
}

impl AudioError {
    pub(crate) fn decode(path: &Path, reason: impl Into<String>) -> Self {
        AudioError::Decode {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
