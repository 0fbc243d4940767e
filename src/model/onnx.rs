// ONNX Runtime backend
// Runs exported classifier graphs with inputs (signal, demographics) -> logits

use ndarray::{ArrayView2, ArrayView3};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

use crate::model::architecture::Architecture;
use crate::model::device::{ComputeConfig, Device};
use crate::model::{EcgModel, ModelError};

/// Classifier backed by an ONNX Runtime session
///
/// The graph must take the signal window `(1, channels, length)` as its first
/// input and the demographic tensor `(1, features)` as its second, and emit the
/// logits as its first output. `Session::run` needs exclusive access, so the
/// session sits behind a mutex.
pub struct OnnxModel {
    session: Mutex<Session>,
    out_channels: usize,
}

impl OnnxModel {
    /// Load a graph from disk on the configured device
    pub fn load(path: &Path, out_channels: usize, compute: &ComputeConfig) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("ONNX model not found: {:?}", path),
            )));
        }

        let builder = Session::builder()
            .map_err(|e| ModelError::InferenceError(format!("session builder: {}", e)))?
            .with_intra_threads(compute.intra_threads.max(1))
            .map_err(|e| ModelError::InferenceError(format!("intra threads: {}", e)))?;

        let builder = match compute.device {
            Device::Cpu => builder,
            Device::Cuda(ordinal) => {
                log::debug!("Registering CUDA execution provider (device {})", ordinal);
                builder
                    .with_execution_providers([
                        CUDAExecutionProvider::default()
                            .with_device_id(ordinal as i32)
                            .build(),
                        CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| ModelError::InferenceError(format!("execution providers: {}", e)))?
            }
        };

        let session = builder
            .commit_from_file(path)
            .map_err(|e| ModelError::CheckpointParse(format!("{:?}: {}", path, e)))?;

        log::debug!(
            "Loaded ONNX model {:?} on {}: inputs {:?}",
            path,
            compute.device,
            session.inputs.iter().map(|i| &i.name).collect::<Vec<_>>()
        );

        Ok(OnnxModel {
            session: Mutex::new(session),
            out_channels,
        })
    }
}

impl EcgModel for OnnxModel {
    fn forward(
        &self,
        window: ArrayView3<'_, f32>,
        demographics: ArrayView2<'_, f32>,
    ) -> Result<Vec<f32>, ModelError> {
        // Window slices are strided views; the runtime needs contiguous buffers
        let signal = Tensor::from_array(window.as_standard_layout().into_owned())
            .map_err(|e| ModelError::InvalidInput(format!("signal tensor: {}", e)))?;
        let demo = Tensor::from_array(demographics.as_standard_layout().into_owned())
            .map_err(|e| ModelError::InvalidInput(format!("demographic tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![signal, demo])
            .map_err(|e| ModelError::InferenceError(e.to_string()))?;

        if outputs.len() == 0 {
            return Err(ModelError::InferenceError(
                "model returned no outputs".to_string(),
            ));
        }

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceError(format!("logits: {}", e)))?;

        if data.len() != self.out_channels {
            return Err(ModelError::InferenceError(format!(
                "expected {} logits, model produced {}",
                self.out_channels,
                data.len()
            )));
        }

        Ok(data.to_vec())
    }

    fn architecture(&self) -> Architecture {
        Architecture::Onnx
    }
}
