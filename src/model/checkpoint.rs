// Checkpoint files
// Name parsing, fingerprints and JSON tensor-map weights

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::ModelError;

/// Key prefix added by data-parallel wrappers around a model
const PARALLEL_PREFIX: &str = "module.";

/// A discovered checkpoint file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    /// Full path to the file
    pub path: PathBuf,

    /// Accuracy encoded in the file name, if it parses
    pub accuracy: Option<f64>,
}

impl Checkpoint {
    /// Describe a checkpoint path, parsing its encoded accuracy
    pub fn new(path: PathBuf, suffix: &str) -> Self {
        let accuracy = path
            .file_name()
            .and_then(|name| parse_accuracy(&name.to_string_lossy(), suffix));
        Checkpoint { path, accuracy }
    }

    /// File name without directory
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Accuracy encoded as the last `-`-separated token before the suffix
/// e.g. `pooled_linear-epoch12-0.9512.json` -> 0.9512
pub fn parse_accuracy(file_name: &str, suffix: &str) -> Option<f64> {
    let token = file_name.rsplit('-').next()?;
    let token = token.strip_suffix(suffix).unwrap_or(token);
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// SHA-256 of a checkpoint file, hex encoded
pub fn fingerprint(path: &Path) -> Result<String, ModelError> {
    let data = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// A dense tensor read from a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    /// Row-major values
    pub data: Vec<f32>,
}

impl Tensor {
    /// Parse a (possibly nested) JSON array of numbers
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let mut shape = Vec::new();
        let mut cursor = value;
        while let Value::Array(items) = cursor {
            shape.push(items.len());
            match items.first() {
                Some(first) => cursor = first,
                None => break,
            }
        }

        let mut data = Vec::with_capacity(shape.iter().product());
        flatten(value, 0, &shape, &mut data)?;
        Ok(Tensor { shape, data })
    }
}

fn flatten(value: &Value, depth: usize, shape: &[usize], out: &mut Vec<f32>) -> Result<(), ModelError> {
    match value {
        Value::Array(items) => {
            if depth >= shape.len() || items.len() != shape[depth] {
                return Err(ModelError::CheckpointParse(
                    "ragged tensor in checkpoint".to_string(),
                ));
            }
            for item in items {
                flatten(item, depth + 1, shape, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            if depth != shape.len() {
                return Err(ModelError::CheckpointParse(
                    "ragged tensor in checkpoint".to_string(),
                ));
            }
            let v = n.as_f64().ok_or_else(|| {
                ModelError::CheckpointParse(format!("non-numeric tensor value {}", n))
            })?;
            out.push(v as f32);
            Ok(())
        }
        other => Err(ModelError::CheckpointParse(format!(
            "unexpected tensor value {}",
            other
        ))),
    }
}

/// Named tensors loaded from a checkpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    pub tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    /// Read a JSON checkpoint from disk
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let data = fs::read(path)?;
        Self::from_json_bytes(&data)
    }

    /// Parse a JSON object of tensors, optionally nested under `state_dict`
    /// Data-parallel `module.` prefixes are stripped from keys
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ModelError> {
        let root: Value = serde_json::from_slice(data)?;
        let object = match root.get("state_dict") {
            Some(inner) => inner,
            None => &root,
        };
        let object = object.as_object().ok_or_else(|| {
            ModelError::CheckpointParse("checkpoint must be a JSON object of tensors".to_string())
        })?;

        let mut tensors = BTreeMap::new();
        for (key, value) in object {
            let key = key.strip_prefix(PARALLEL_PREFIX).unwrap_or(key);
            tensors.insert(key.to_string(), Tensor::from_json(value)?);
        }

        Ok(StateDict { tensors })
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.tensors.get(key)
    }
}

/// Outcome of a non-strict state dict load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Parameters the model expected but the checkpoint lacked
    pub missing_keys: Vec<String>,

    /// Checkpoint entries the model does not use
    pub unexpected_keys: Vec<String>,
}

impl LoadReport {
    pub fn is_exact(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty()
    }

    /// Log key mismatches for a checkpoint
    pub fn log(&self, checkpoint: &Path) {
        if !self.missing_keys.is_empty() {
            log::warn!(
                "Checkpoint {:?} is missing keys {:?}; keeping initial values",
                checkpoint,
                self.missing_keys
            );
        }
        if !self.unexpected_keys.is_empty() {
            log::warn!(
                "Checkpoint {:?} has unexpected keys {:?}; ignoring",
                checkpoint,
                self.unexpected_keys
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_accuracy() {
        assert_eq!(parse_accuracy("model-0.95.json", ".json"), Some(0.95));
        assert_eq!(
            parse_accuracy("pooled_linear-epoch12-0.9512.json", ".json"),
            Some(0.9512)
        );
        assert_eq!(parse_accuracy("model-best.json", ".json"), None);
        assert_eq!(parse_accuracy("model-NaN.json", ".json"), None);
    }

    #[test]
    fn test_checkpoint_new() {
        let ckpt = Checkpoint::new(PathBuf::from("/models/net-0.91.json"), ".json");
        assert_eq!(ckpt.accuracy, Some(0.91));
        assert_eq!(ckpt.file_name(), "net-0.91.json");
    }

    #[test]
    fn test_tensor_from_json() {
        let value = serde_json::json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let tensor = Tensor::from_json(&value).unwrap();
        assert_eq!(tensor.shape, vec![2, 3]);
        assert_eq!(tensor.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let scalar = Tensor::from_json(&serde_json::json!(0.5)).unwrap();
        assert!(scalar.shape.is_empty());
        assert_eq!(scalar.data, vec![0.5]);
    }

    #[test]
    fn test_ragged_tensor_is_rejected() {
        let value = serde_json::json!([[1.0, 2.0], [3.0]]);
        assert!(matches!(
            Tensor::from_json(&value),
            Err(ModelError::CheckpointParse(_))
        ));
    }

    #[test]
    fn test_state_dict_strips_parallel_prefix() {
        let json = br#"{"state_dict": {"module.bias": [0.1, 0.2], "weight": [[1.0]]}}"#;
        let dict = StateDict::from_json_bytes(json).unwrap();

        assert!(dict.get("bias").is_some());
        assert!(dict.get("module.bias").is_none());
        assert_eq!(dict.get("weight").unwrap().shape, vec![1, 1]);
    }

    #[test]
    fn test_state_dict_rejects_non_object() {
        assert!(StateDict::from_json_bytes(b"[1, 2, 3]").is_err());
        assert!(StateDict::from_json_bytes(b"not json").is_err());
    }

    #[test]
    fn test_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("net-0.5.json");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            fingerprint(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
