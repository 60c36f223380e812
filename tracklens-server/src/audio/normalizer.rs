//! Fixed-length audio normalization
//!
//! Decode → mono → resample → pad/truncate. Every `AudioSignal` produced
//! here holds exactly `round(rate * duration)` samples.

use std::path::Path;
use tracing::debug;

use super::decoder::decode_audio_file;
use super::resampler::resample_mono;
use super::AudioError;

/// Mono waveform at a known sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Produces fixed-rate, fixed-length mono signals from audio files
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    target_rate: u32,
    duration_secs: f64,
}

impl AudioNormalizer {
    pub fn new(target_rate: u32, duration_secs: f64) -> Self {
        Self {
            target_rate,
            duration_secs,
        }
    }

    /// Number of samples every normalized signal holds
    pub fn target_samples(&self) -> usize {
        (self.target_rate as f64 * self.duration_secs).round() as usize
    }

    /// Decode and normalize an audio file. Only the leading
    /// `duration_secs` of the file are decoded.
    pub fn normalize(&self, path: &Path) -> Result<AudioSignal, AudioError> {
        let decoded = decode_audio_file(path, Some(self.duration_secs))?;
        self.normalize_samples(&decoded.samples, decoded.sample_rate)
    }

    /// Normalize an already-decoded mono signal.
    pub fn normalize_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<AudioSignal, AudioError> {
        let mut samples = resample_mono(samples, sample_rate, self.target_rate)?;

        let target = self.target_samples();
        debug!(
            source_rate = sample_rate,
            resampled = samples.len(),
            target,
            "Fitting signal to fixed length"
        );
        // Truncates when longer, zero-pads at the end when shorter
        samples.resize(target, 0.0);

        Ok(AudioSignal {
            samples,
            sample_rate: self.target_rate,
        })
    }
}
