// Model module
// Classifier abstraction, concrete architectures and checkpoint loading

pub mod architecture;
pub mod checkpoint;
pub mod device;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pooled_linear;

use ndarray::{ArrayView2, ArrayView3};
use thiserror::Error;

pub use architecture::Architecture;
pub use checkpoint::{parse_accuracy, Checkpoint, LoadReport, StateDict, Tensor};
pub use device::{ComputeConfig, Device};
pub use loader::{discover_checkpoints, load_model, select_checkpoints, LoadedModel};
pub use pooled_linear::PooledLinear;

/// Errors that can occur while loading or running a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown architecture '{0}'")]
    UnknownArchitecture(String),

    #[error("Architecture not available in this build: {0}")]
    ArchitectureNotAvailable(String),

    #[error("Failed to read checkpoint: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse checkpoint: {0}")]
    CheckpointParse(String),

    #[error("Shape mismatch for '{key}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Invalid model input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(error: serde_json::Error) -> Self {
        ModelError::CheckpointParse(error.to_string())
    }
}

/// A pretrained ECG classifier in inference mode
///
/// Takes one signal window of shape (1, channels, length) and the demographic
/// tensor of shape (1, features), and returns one logit per class.
/// Implementations hold no per-call state.
pub trait EcgModel: Send + Sync {
    /// Run a forward pass and return raw (pre-sigmoid) logits
    fn forward(
        &self,
        window: ArrayView3<'_, f32>,
        demographics: ArrayView2<'_, f32>,
    ) -> Result<Vec<f32>, ModelError>;

    /// Architecture this model was built from
    fn architecture(&self) -> Architecture;
}

impl<M: EcgModel + ?Sized> EcgModel for Box<M> {
    fn forward(
        &self,
        window: ArrayView3<'_, f32>,
        demographics: ArrayView2<'_, f32>,
    ) -> Result<Vec<f32>, ModelError> {
        (**self).forward(window, demographics)
    }

    fn architecture(&self) -> Architecture {
        (**self).architecture()
    }
}
