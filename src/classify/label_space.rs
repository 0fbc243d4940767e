// Label space
// Taxonomy and thresholds bundled, with positional alignment checked once

use thiserror::Error;

use crate::classify::taxonomy::ClassTaxonomy;
use crate::classify::threshold::ThresholdVector;

#[derive(Debug, Error)]
pub enum LabelSpaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid class taxonomy: {0}")]
    Taxonomy(String),

    #[error("Failed to parse threshold artifact: {0}")]
    ThresholdParse(#[from] serde_json::Error),

    #[error("Invalid thresholds: {0}")]
    Threshold(String),

    #[error("Label space misaligned: {taxonomy} classes, {thresholds} thresholds, model emits {num_classes}")]
    Misaligned {
        taxonomy: usize,
        thresholds: usize,
        num_classes: usize,
    },

    #[error("Threshold class {index} is '{found}', taxonomy has '{expected}'")]
    ClassOrder {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Expected {expected} scores, got {found}")]
    ScoreLength { expected: usize, found: usize },
}

/// Classes and thresholds that agree on length and order
#[derive(Debug, Clone)]
pub struct LabelSpace {
    taxonomy: ClassTaxonomy,
    thresholds: ThresholdVector,
}

impl LabelSpace {
    /// Bundle a taxonomy with its thresholds for a model emitting `num_classes` logits
    pub fn new(
        taxonomy: ClassTaxonomy,
        thresholds: ThresholdVector,
        num_classes: usize,
    ) -> Result<Self, LabelSpaceError> {
        if taxonomy.len() != num_classes || thresholds.len() != num_classes {
            return Err(LabelSpaceError::Misaligned {
                taxonomy: taxonomy.len(),
                thresholds: thresholds.len(),
                num_classes,
            });
        }

        if let Some(classes) = &thresholds.classes {
            if classes.len() != num_classes {
                return Err(LabelSpaceError::Misaligned {
                    taxonomy: taxonomy.len(),
                    thresholds: classes.len(),
                    num_classes,
                });
            }
            for (index, (expected, found)) in taxonomy.classes().iter().zip(classes).enumerate() {
                if expected != found {
                    return Err(LabelSpaceError::ClassOrder {
                        index,
                        expected: expected.clone(),
                        found: found.clone(),
                    });
                }
            }
        }

        Ok(LabelSpace {
            taxonomy,
            thresholds,
        })
    }

    pub fn taxonomy(&self) -> &ClassTaxonomy {
        &self.taxonomy
    }

    pub fn classes(&self) -> &[String] {
        self.taxonomy.classes()
    }

    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds.values
    }

    pub fn len(&self) -> usize {
        self.taxonomy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxonomy.is_empty()
    }
}
