//! ONNX Runtime classifier backend

use ndarray::Array4;
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;

use super::{ClassifierError, ClassifierModel};
use crate::onnx::{self, ExecutionDevice, ModelLoadError};

pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    pub fn load(
        path: &Path,
        device: ExecutionDevice,
        intra_threads: usize,
    ) -> Result<Self, ModelLoadError> {
        let session = onnx::load_session(path, device, intra_threads)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl ClassifierModel for OnnxClassifier {
    fn forward(&self, input: Array4<f32>) -> Result<f32, ClassifierError> {
        let output = {
            let mut session = self.session.lock().map_err(|_| {
                ClassifierError::Inference("classifier session lock poisoned".to_string())
            })?;
            onnx::run_single(&mut session, input).map_err(ClassifierError::Inference)?
        };

        match output.data.as_slice() {
            [value] => Ok(*value),
            _ => Err(ClassifierError::Output {
                len: output.data.len(),
                shape: output.shape,
            }),
        }
    }
}
