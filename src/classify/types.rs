// Classification output types

use serde::{Deserialize, Serialize};

/// Labels, scores and class codes for one record, positionally aligned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// 1 if the class is predicted present, else 0
    pub labels: Vec<u8>,

    /// Ensemble-mean probability per class
    pub scores: Vec<f32>,

    /// SNOMED CT codes in canonical order
    pub classes: Vec<String>,
}

impl InferenceResult {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Codes whose label is set
    pub fn positive_classes(&self) -> Vec<&str> {
        self.classes
            .iter()
            .zip(&self.labels)
            .filter(|(_, &label)| label == 1)
            .map(|(code, _)| code.as_str())
            .collect()
    }
}

/// How the label of one class was decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecision {
    pub code: String,
    pub score: f32,
    pub threshold: f32,

    /// Class had the highest score of the record
    pub by_argmax: bool,

    /// Score reached the class threshold
    pub by_threshold: bool,

    pub label: u8,
}

impl ClassDecision {
    /// Human-readable explanation of the decision
    pub fn reasoning(&self) -> String {
        match (self.by_argmax, self.by_threshold) {
            (true, true) => format!(
                "{}: top-scoring class and {:.3} >= threshold {:.3}",
                self.code, self.score, self.threshold
            ),
            (true, false) => format!(
                "{}: top-scoring class ({:.3}) below threshold {:.3}",
                self.code, self.score, self.threshold
            ),
            (false, true) => format!(
                "{}: {:.3} >= threshold {:.3}",
                self.code, self.score, self.threshold
            ),
            (false, false) => format!(
                "{}: {:.3} < threshold {:.3}",
                self.code, self.score, self.threshold
            ),
        }
    }
}
