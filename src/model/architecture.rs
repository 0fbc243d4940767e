// Model architecture registry
// Closed set of architectures, resolved from a configuration name once at load time

use std::path::Path;

use crate::model::checkpoint::StateDict;
use crate::model::device::ComputeConfig;
use crate::model::pooled_linear::PooledLinear;
use crate::model::{EcgModel, ModelError};

/// Supported classifier architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Per-lead mean/std pooling followed by a dense layer
    /// Native implementation, JSON tensor-map checkpoints
    PooledLinear,

    /// Exported graph executed by ONNX Runtime
    #[cfg(feature = "onnx")]
    Onnx,
}

impl Architecture {
    /// All architectures available in this build
    pub fn all() -> &'static [Architecture] {
        &[
            Architecture::PooledLinear,
            #[cfg(feature = "onnx")]
            Architecture::Onnx,
        ]
    }

    /// Configuration name
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::PooledLinear => "pooled_linear",
            #[cfg(feature = "onnx")]
            Architecture::Onnx => "onnx",
        }
    }

    /// File suffix of this architecture's checkpoints
    pub fn checkpoint_suffix(&self) -> &'static str {
        match self {
            Architecture::PooledLinear => ".json",
            #[cfg(feature = "onnx")]
            Architecture::Onnx => ".onnx",
        }
    }

    /// Build a model from a checkpoint file in inference mode
    ///
    /// Weight loading is non-strict: missing and unexpected keys are reported
    /// and logged but do not fail; tensors with the wrong shape do.
    pub fn instantiate(
        &self,
        checkpoint: &Path,
        in_channels: usize,
        out_channels: usize,
        compute: &ComputeConfig,
    ) -> Result<Box<dyn EcgModel>, ModelError> {
        match self {
            Architecture::PooledLinear => {
                log::debug!(
                    "Building {} from {:?} on the host (configured device {})",
                    self,
                    checkpoint,
                    compute.device
                );
                let mut model = PooledLinear::new(in_channels, out_channels);
                let state_dict = StateDict::from_file(checkpoint)?;
                let report = model.load_state_dict(&state_dict)?;
                report.log(checkpoint);
                Ok(Box::new(model))
            }
            #[cfg(feature = "onnx")]
            Architecture::Onnx => {
                let model = crate::model::onnx::OnnxModel::load(checkpoint, out_channels, compute)?;
                Ok(Box::new(model))
            }
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Architecture {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pooled_linear" | "pooledlinear" => Ok(Architecture::PooledLinear),
            #[cfg(feature = "onnx")]
            "onnx" => Ok(Architecture::Onnx),
            #[cfg(not(feature = "onnx"))]
            "onnx" => Err(ModelError::ArchitectureNotAvailable(
                "onnx (enable the 'onnx' feature)".to_string(),
            )),
            _ => Err(ModelError::UnknownArchitecture(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_architecture() {
        let arch: Architecture = "pooled_linear".parse().unwrap();
        assert_eq!(arch, Architecture::PooledLinear);

        let arch: Architecture = "PooledLinear".parse().unwrap();
        assert_eq!(arch, Architecture::PooledLinear);
    }

    #[test]
    fn test_unknown_architecture_is_rejected() {
        let result = "resnet9000".parse::<Architecture>();
        assert!(matches!(result, Err(ModelError::UnknownArchitecture(name)) if name == "resnet9000"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_without_feature() {
        let result = "onnx".parse::<Architecture>();
        assert!(matches!(result, Err(ModelError::ArchitectureNotAvailable(_))));
    }

    #[test]
    fn test_instantiate_pooled_linear_ignores_device() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pooled_linear-0.9.json");
        std::fs::write(&path, br#"{"bias": [1.0, 2.0, 3.0]}"#).unwrap();

        let compute = ComputeConfig {
            device: crate::model::Device::Cuda(0),
            intra_threads: 4,
        };
        let model = Architecture::PooledLinear.instantiate(&path, 12, 3, &compute).unwrap();
        assert_eq!(model.architecture(), Architecture::PooledLinear);

        let window = ndarray::Array3::<f32>::zeros((1, 12, 64));
        let demo = ndarray::Array2::<f32>::zeros((1, 5));
        assert_eq!(model.forward(window.view(), demo.view()).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_name_round_trip() {
        for arch in Architecture::all() {
            assert_eq!(arch.name().parse::<Architecture>().unwrap(), *arch);
            assert!(arch.checkpoint_suffix().starts_with('.'));
        }
    }
}
