// Decision thresholds
// Per-class probability cut-offs stored as a JSON artifact

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::classify::label_space::LabelSpaceError;

/// File name of the threshold artifact when it sits next to the checkpoints
pub const DEFAULT_FILE_NAME: &str = "thresholds.json";

/// One threshold per class, positionally aligned with the taxonomy
///
/// On disk: `{"arr_0": [..], "classes": [..]}`; `classes` is optional and,
/// when present, pins the order the thresholds were fitted in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVector {
    #[serde(rename = "arr_0")]
    pub values: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
}

impl ThresholdVector {
    pub fn new(values: Vec<f32>) -> Self {
        ThresholdVector {
            values,
            classes: None,
        }
    }

    /// Same threshold for every class
    pub fn uniform(num_classes: usize, value: f32) -> Self {
        Self::new(vec![value; num_classes])
    }

    /// Parse and check that every threshold is finite
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, LabelSpaceError> {
        let thresholds: ThresholdVector = serde_json::from_slice(data)?;
        if let Some(index) = thresholds.values.iter().position(|v| !v.is_finite()) {
            return Err(LabelSpaceError::Threshold(format!(
                "threshold {} is not finite",
                index
            )));
        }
        Ok(thresholds)
    }

    pub fn from_file(path: &Path) -> Result<Self, LabelSpaceError> {
        let data = fs::read(path)?;
        let thresholds = Self::from_json_bytes(&data)?;
        log::debug!("Loaded {} thresholds from {:?}", thresholds.len(), path);
        Ok(thresholds)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
