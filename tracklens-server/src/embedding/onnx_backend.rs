//! ONNX Runtime frame embedder
//!
//! Expects a model taking raw audio windows shaped `[batch, 1, samples]`
//! and returning `[batch, dim]` embeddings.

use ndarray::{Array2, Axis};
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;

use super::{EmbeddingError, FrameEmbedder};
use crate::onnx::{self, ExecutionDevice, ModelLoadError, ModelOutput};

pub struct OnnxFrameEmbedder {
    session: Mutex<Session>,
    sample_rate: u32,
    window_samples: usize,
}

impl OnnxFrameEmbedder {
    pub fn load(
        path: &Path,
        device: ExecutionDevice,
        intra_threads: usize,
        sample_rate: u32,
        window_secs: f64,
    ) -> Result<Self, ModelLoadError> {
        let session = onnx::load_session(path, device, intra_threads)?;
        Ok(Self {
            session: Mutex::new(session),
            sample_rate,
            window_samples: (sample_rate as f64 * window_secs).round() as usize,
        })
    }
}

impl FrameEmbedder for OnnxFrameEmbedder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn window_samples(&self) -> usize {
        self.window_samples
    }

    fn embed_batch(&self, frames: Array2<f32>) -> Result<ModelOutput, EmbeddingError> {
        let input = frames.insert_axis(Axis(1));
        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Inference("embedding session lock poisoned".to_string()))?;
        onnx::run_single(&mut session, input).map_err(EmbeddingError::Inference)
    }
}
