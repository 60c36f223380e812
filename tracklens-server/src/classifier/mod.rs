//! AI-vs-human clip classification
//!
//! Fixed-length clip → dB mel spectrogram `(1, 1, n_mels, frames)` → CNN →
//! single raw output → probability → verdict.

pub mod onnx_backend;

pub use onnx_backend::OnnxClassifier;

use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::audio::{AudioError, AudioNormalizer, MelConfig, MelSpectrogram};

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier model not loaded")]
    ModelNotLoaded,

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Classifier inference failed: {0}")]
    Inference(String),

    /// The network must produce exactly one value per clip
    #[error("Classifier produced {len} values with shape {shape:?}, expected one")]
    Output { shape: Vec<usize>, len: usize },
}

/// A network mapping a `(1, 1, n_mels, frames)` spectrogram to one value
pub trait ClassifierModel: Send + Sync {
    fn forward(&self, input: Array4<f32>) -> Result<f32, ClassifierError>;
}

/// How the network's raw output relates to the AI probability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// The network ends in a sigmoid; the raw output is the probability
    #[default]
    Sigmoid,
    /// The network emits a logit; probability is `sigmoid(raw)`
    Logits,
}

impl OutputActivation {
    pub fn probability(self, raw: f32) -> f32 {
        match self {
            OutputActivation::Sigmoid => raw,
            OutputActivation::Logits => 1.0 / (1.0 + (-raw).exp()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ai,
    Human,
}

impl Verdict {
    /// AI when `probability` is strictly above `threshold`
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability > threshold {
            Verdict::Ai
        } else {
            Verdict::Human
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Ai => "AI Classified",
            Verdict::Human => "Human-Made Classified",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome for one clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub probability: f32,
    pub raw_output: f32,
    pub verdict: Verdict,
}

/// Front-end and decision parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierSettings {
    pub sample_rate: u32,
    pub max_ms: u32,
    pub n_mels: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub activation: OutputActivation,
    pub threshold: f32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            max_ms: 4000,
            n_mels: 64,
            n_fft: 400,
            hop_length: 200,
            activation: OutputActivation::Sigmoid,
            threshold: 0.5,
        }
    }
}

pub struct AudioClassifier {
    normalizer: AudioNormalizer,
    mel: MelSpectrogram,
    model: Option<Arc<dyn ClassifierModel>>,
    settings: ClassifierSettings,
}

impl fmt::Debug for AudioClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClassifier")
            .field("loaded", &self.is_loaded())
            .field("settings", &self.settings)
            .finish()
    }
}

impl AudioClassifier {
    pub fn new(model: Arc<dyn ClassifierModel>, settings: ClassifierSettings) -> Self {
        Self::build(Some(model), settings)
    }

    /// Classifier whose model failed to initialize
    pub fn unloaded(settings: ClassifierSettings) -> Self {
        Self::build(None, settings)
    }

    fn build(model: Option<Arc<dyn ClassifierModel>>, settings: ClassifierSettings) -> Self {
        let duration_secs = settings.max_ms as f64 / 1000.0;
        Self {
            normalizer: AudioNormalizer::new(settings.sample_rate, duration_secs),
            mel: MelSpectrogram::new(MelConfig {
                sample_rate: settings.sample_rate,
                n_fft: settings.n_fft,
                hop_length: settings.hop_length,
                n_mels: settings.n_mels,
            }),
            model,
            settings,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Network input for the clip at `path`, shaped `(1, 1, n_mels, frames)`
    pub fn features(&self, path: &Path) -> Result<Array4<f32>, ClassifierError> {
        let signal = self.normalizer.normalize(path)?;
        let spec = self.mel.compute(&signal.samples);
        let (n_mels, frames) = spec.dim();
        spec.into_shape_with_order((1, 1, n_mels, frames))
            .map_err(|e| ClassifierError::Inference(e.to_string()))
    }

    pub fn classify(&self, path: &Path) -> Result<Classification, ClassifierError> {
        let model = self.model.as_ref().ok_or(ClassifierError::ModelNotLoaded)?;

        let input = self.features(path)?;
        let raw_output = model.forward(input)?;
        let probability = self.settings.activation.probability(raw_output);
        let verdict = Verdict::from_probability(probability, self.settings.threshold);

        info!(
            path = %path.display(),
            raw_output,
            probability,
            %verdict,
            "Clip classified"
        );

        Ok(Classification {
            probability,
            raw_output,
            verdict,
        })
    }
}
