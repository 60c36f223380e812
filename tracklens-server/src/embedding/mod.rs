//! Clip-level audio embeddings
//!
//! A normalized clip is cut into overlapping analysis windows, each window is
//! embedded by a frame model, and the frame embeddings are mean-pooled into
//! one L2-normalized vector per clip.

pub mod onnx_backend;

pub use onnx_backend::OnnxFrameEmbedder;

use ndarray::{Array1, Array2, ArrayView1};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::audio::{resample_mono, AudioError, AudioSignal};
use crate::onnx::ModelOutput;

/// Added to the pooled norm before dividing, so silence maps to the zero vector
const NORM_EPSILON: f32 = 1e-12;

/// Embedding errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding model not loaded")]
    ModelNotLoaded,

    /// Model output did not have the `[b, D]` / `[1, b, D]` layout
    #[error("Unexpected embedding output shape {shape:?}: {reason}")]
    Shape { shape: Vec<usize>, reason: String },

    #[error("Embedding inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// A model that embeds fixed-size windows of raw audio.
///
/// `embed_batch` receives `(batch, window_samples)` audio at `sample_rate`
/// and returns the model's first output tensor unchanged.
pub trait FrameEmbedder: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn window_samples(&self) -> usize;

    fn embed_batch(&self, frames: Array2<f32>) -> Result<ModelOutput, EmbeddingError>;
}

/// Framing and pooling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingSettings {
    /// Hop between analysis windows, in seconds
    pub hop_size: f64,
    /// Pad half a window of zeros at both ends before framing
    pub center: bool,
    pub batch_size: usize,
    pub embedding_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            hop_size: 0.1,
            center: true,
            batch_size: 32,
            embedding_dim: 512,
        }
    }
}

/// Turns normalized clips into pooled embedding vectors
#[derive(Clone)]
pub struct EmbeddingExtractor {
    model: Option<Arc<dyn FrameEmbedder>>,
    settings: EmbeddingSettings,
}

impl std::fmt::Debug for EmbeddingExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingExtractor")
            .field("loaded", &self.is_loaded())
            .field("settings", &self.settings)
            .finish()
    }
}

impl EmbeddingExtractor {
    pub fn new(model: Arc<dyn FrameEmbedder>, settings: EmbeddingSettings) -> Self {
        Self {
            model: Some(model),
            settings,
        }
    }

    /// Extractor whose model failed to initialize. Every call to
    /// [`extract`](Self::extract) fails with `ModelNotLoaded`.
    pub fn unloaded(settings: EmbeddingSettings) -> Self {
        Self {
            model: None,
            settings,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Embed one clip.
    pub fn extract(&self, signal: &AudioSignal) -> Result<Vec<f32>, EmbeddingError> {
        let model = self.model.as_ref().ok_or(EmbeddingError::ModelNotLoaded)?;

        let model_rate = model.sample_rate();
        let samples = if signal.sample_rate == model_rate {
            signal.samples.clone()
        } else {
            resample_mono(&signal.samples, signal.sample_rate, model_rate)?
        };

        let window = model.window_samples().max(1);
        let hop = ((self.settings.hop_size * model_rate as f64).round() as usize).max(1);
        let padded = frame_source(&samples, window, self.settings.center);
        let frame_count = 1 + (padded.len() - window) / hop;
        let batch_size = self.settings.batch_size.max(1);
        let dim = self.settings.embedding_dim;

        debug!(
            samples = samples.len(),
            model_rate,
            window,
            hop,
            frames = frame_count,
            "Extracting embedding"
        );

        let mut sum = Array1::<f32>::zeros(dim);
        let mut start_frame = 0;
        while start_frame < frame_count {
            let rows = batch_size.min(frame_count - start_frame);
            let mut batch = Array2::<f32>::zeros((rows, window));
            for (r, mut row) in batch.rows_mut().into_iter().enumerate() {
                let offset = (start_frame + r) * hop;
                row.assign(&ArrayView1::from(&padded[offset..offset + window]));
            }

            let output = model.embed_batch(batch)?;
            let embeddings = batch_embeddings(output, rows, dim)?;
            sum += &embeddings.sum_axis(ndarray::Axis(0));

            start_frame += rows;
        }

        let mean = sum / frame_count as f32;
        let norm = mean.dot(&mean).sqrt();
        Ok((mean / (norm + NORM_EPSILON)).to_vec())
    }
}

/// Signal to cut frames from: center-padded when requested, and never
/// shorter than one window.
fn frame_source(samples: &[f32], window: usize, center: bool) -> Vec<f32> {
    let pad = if center { window / 2 } else { 0 };
    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    padded.resize(pad, 0.0);
    padded.extend_from_slice(samples);
    padded.resize(padded.len() + pad, 0.0);
    if padded.len() < window {
        padded.resize(window, 0.0);
    }
    padded
}

/// Reshape one batch of model output to `(rows, dim)`.
fn batch_embeddings(
    output: ModelOutput,
    rows: usize,
    dim: usize,
) -> Result<Array2<f32>, EmbeddingError> {
    let shape_error = |shape: &[usize], reason: String| EmbeddingError::Shape {
        shape: shape.to_vec(),
        reason,
    };

    let dims: &[usize] = match output.shape.as_slice() {
        [1, rest @ ..] if rest.len() == 2 => rest,
        other if other.len() == 2 => other,
        other => {
            return Err(shape_error(
                other,
                "expected [batch, dim] or [1, batch, dim]".to_string(),
            ))
        }
    };

    if dims[0] != rows {
        return Err(shape_error(
            output.shape.as_slice(),
            format!("expected {} frames, got {}", rows, dims[0]),
        ));
    }
    if dims[1] != dim {
        return Err(shape_error(
            output.shape.as_slice(),
            format!("expected embedding size {}, got {}", dim, dims[1]),
        ));
    }

    let shape = output.shape.clone();
    Array2::from_shape_vec((rows, dim), output.data)
        .map_err(|e| shape_error(shape.as_slice(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Embeds a window as `[mean, mean^2, 0, ...]`, recording batch sizes
    struct MeanEmbedder {
        rate: u32,
        window: usize,
        dim: usize,
        leading_axis: bool,
        batches: Mutex<Vec<usize>>,
    }

    impl MeanEmbedder {
        fn new(rate: u32, window: usize, dim: usize) -> Self {
            Self {
                rate,
                window,
                dim,
                leading_axis: false,
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    impl FrameEmbedder for MeanEmbedder {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn window_samples(&self) -> usize {
            self.window
        }

        fn embed_batch(&self, frames: Array2<f32>) -> Result<ModelOutput, EmbeddingError> {
            assert_eq!(frames.ncols(), self.window);
            let rows = frames.nrows();
            self.batches.lock().unwrap().push(rows);

            let mut data = vec![0.0; rows * self.dim];
            for (r, frame) in frames.rows().into_iter().enumerate() {
                let mean = frame.mean().unwrap_or(0.0);
                data[r * self.dim] = mean;
                data[r * self.dim + 1] = mean * mean;
            }
            let shape = if self.leading_axis {
                vec![1, rows, self.dim]
            } else {
                vec![rows, self.dim]
            };
            Ok(ModelOutput { shape, data })
        }
    }

    /// Always answers with a fixed output shape
    struct FixedShapeEmbedder(Vec<usize>);

    impl FrameEmbedder for FixedShapeEmbedder {
        fn sample_rate(&self) -> u32 {
            1000
        }

        fn window_samples(&self) -> usize {
            100
        }

        fn embed_batch(&self, _frames: Array2<f32>) -> Result<ModelOutput, EmbeddingError> {
            let len = self.0.iter().product();
            Ok(ModelOutput {
                shape: self.0.clone(),
                data: vec![1.0; len],
            })
        }
    }

    fn settings(batch_size: usize, dim: usize) -> EmbeddingSettings {
        EmbeddingSettings {
            hop_size: 0.1,
            center: true,
            batch_size,
            embedding_dim: dim,
        }
    }

    fn constant_signal(value: f32, rate: u32, len: usize) -> AudioSignal {
        AudioSignal {
            samples: vec![value; len],
            sample_rate: rate,
        }
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_non_silent_clip_has_unit_norm() {
        let model = Arc::new(MeanEmbedder::new(1000, 1000, 8));
        let extractor = EmbeddingExtractor::new(model, settings(32, 8));

        let embedding = extractor.extract(&constant_signal(0.4, 1000, 2000)).unwrap();
        assert_eq!(embedding.len(), 8);
        assert!((norm(&embedding) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_silent_clip_yields_zero_vector() {
        let model = Arc::new(MeanEmbedder::new(1000, 1000, 8));
        let extractor = EmbeddingExtractor::new(model, settings(32, 8));

        let embedding = extractor.extract(&constant_signal(0.0, 1000, 2000)).unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_frames_are_centered_and_batched() {
        let model = Arc::new(MeanEmbedder::new(1000, 1000, 4));
        let extractor = EmbeddingExtractor::new(model.clone(), settings(8, 4));

        // 2000 samples + 500 padding each side, hop 100 → 21 frames
        extractor.extract(&constant_signal(0.2, 1000, 2000)).unwrap();
        assert_eq!(*model.batches.lock().unwrap(), vec![8, 8, 5]);
    }

    #[test]
    fn test_short_clip_gets_one_frame() {
        let model = Arc::new(MeanEmbedder::new(1000, 1000, 4));
        let mut no_center = settings(8, 4);
        no_center.center = false;
        let extractor = EmbeddingExtractor::new(model.clone(), no_center);

        extractor.extract(&constant_signal(0.2, 1000, 300)).unwrap();
        assert_eq!(*model.batches.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_signal_is_resampled_to_model_rate() {
        let model = Arc::new(MeanEmbedder::new(1000, 1000, 4));
        let extractor = EmbeddingExtractor::new(model.clone(), settings(64, 4));

        // 1 s at 500 Hz becomes 1000 samples, padded to 2000 → 11 frames
        let embedding = extractor.extract(&constant_signal(0.3, 500, 500)).unwrap();
        assert_eq!(*model.batches.lock().unwrap(), vec![11]);
        assert!((norm(&embedding) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_leading_singleton_axis_is_accepted() {
        let mut embedder = MeanEmbedder::new(1000, 1000, 4);
        embedder.leading_axis = true;
        let extractor = EmbeddingExtractor::new(Arc::new(embedder), settings(32, 4));

        let embedding = extractor.extract(&constant_signal(0.5, 1000, 1000)).unwrap();
        assert!((norm(&embedding) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_wrong_embedding_size_is_a_shape_error() {
        let extractor =
            EmbeddingExtractor::new(Arc::new(MeanEmbedder::new(1000, 1000, 6)), settings(32, 4));

        let err = extractor.extract(&constant_signal(0.5, 1000, 1000)).unwrap_err();
        assert!(matches!(err, EmbeddingError::Shape { .. }), "{:?}", err);
    }

    #[test]
    fn test_unexpected_rank_is_a_shape_error() {
        let extractor = EmbeddingExtractor::new(
            Arc::new(FixedShapeEmbedder(vec![2, 3, 4])),
            settings(32, 4),
        );

        let err = extractor.extract(&constant_signal(0.5, 1000, 100)).unwrap_err();
        assert!(matches!(err, EmbeddingError::Shape { .. }), "{:?}", err);
    }

    #[test]
    fn test_unloaded_extractor_refuses() {
        let extractor = EmbeddingExtractor::unloaded(EmbeddingSettings::default());
        assert!(!extractor.is_loaded());

        let err = extractor.extract(&constant_signal(0.5, 16000, 16000)).unwrap_err();
        assert_eq!(err.to_string(), "Embedding model not loaded");
    }
}
