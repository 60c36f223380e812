//! ONNX Runtime session plumbing shared by the embedding and classifier
//! backends.
//!
//! Sessions are built once at startup. `Session::run` needs `&mut self`, so
//! each backend keeps its session behind a `Mutex`.

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Hardware the ONNX sessions run on. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    Cuda,
}

impl ExecutionDevice {
    /// Pick the device for this process.
    ///
    /// CUDA is only available when built with the `cuda` feature; otherwise
    /// a GPU request falls back to the CPU with a warning.
    pub fn select(prefer_gpu: bool) -> Self {
        if !prefer_gpu {
            return ExecutionDevice::Cpu;
        }
        if cfg!(feature = "cuda") {
            ExecutionDevice::Cuda
        } else {
            warn!("GPU requested but built without the `cuda` feature, using CPU");
            ExecutionDevice::Cpu
        }
    }
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionDevice::Cpu => write!(f, "cpu"),
            ExecutionDevice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Model loading failures
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to load model {}: {reason}", .path.display())]
    Runtime { path: PathBuf, reason: String },
}

/// Build an inference session for the model at `path`.
pub fn load_session(
    path: &Path,
    device: ExecutionDevice,
    intra_threads: usize,
) -> Result<Session, ModelLoadError> {
    if !path.exists() {
        return Err(ModelLoadError::Missing(path.to_path_buf()));
    }

    let builder = Session::builder()
        .map_err(|e| runtime_error(path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| runtime_error(path, e))?
        .with_intra_threads(intra_threads.max(1))
        .map_err(|e| runtime_error(path, e))?;

    let session = register_device(builder, device)
        .map_err(|e| runtime_error(path, e))?
        .commit_from_file(path)
        .map_err(|e| runtime_error(path, e))?;

    info!(path = %path.display(), %device, "ONNX model loaded");
    Ok(session)
}

fn runtime_error(path: &Path, e: impl fmt::Display) -> ModelLoadError {
    ModelLoadError::Runtime {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(feature = "cuda")]
fn register_device(builder: SessionBuilder, device: ExecutionDevice) -> Result<SessionBuilder, String> {
    use ort::execution_providers::CUDAExecutionProvider;

    match device {
        // ONNX Runtime silently keeps the CPU provider if CUDA cannot be registered
        ExecutionDevice::Cuda => {
            builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| e.to_string())
        }
        ExecutionDevice::Cpu => Ok(builder),
    }
}

#[cfg(not(feature = "cuda"))]
fn register_device(builder: SessionBuilder, _device: ExecutionDevice) -> Result<SessionBuilder, String> {
    Ok(builder)
}

/// First output tensor of a session run, flattened
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Run `session` on a single f32 input and return its first output.
pub fn run_single<D>(session: &mut Session, input: ndarray::Array<f32, D>) -> Result<ModelOutput, String>
where
    D: ndarray::Dimension + 'static,
{
    let tensor = Tensor::from_array(input).map_err(|e| format!("input tensor: {}", e))?;

    let outputs = session
        .run(ort::inputs![tensor])
        .map_err(|e| format!("inference failed: {}", e))?;

    let (_, value) = outputs
        .iter()
        .next()
        .ok_or_else(|| "model produced no output".to_string())?;

    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| format!("output extraction: {}", e))?;

    Ok(ModelOutput {
        shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
        data: data.to_vec(),
    })
}
