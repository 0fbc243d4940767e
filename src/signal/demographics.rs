// Demographic encoding
// Converts header age/sex fields into the fixed feature vector every model consumes

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Length of the encoded demographic vector
pub const DEMOGRAPHIC_FEATURES: usize = 5;

/// Recorded sex of the patient
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    /// Missing or NaN in the header
    Unknown,
    /// Any other recorded value, kept verbatim
    Other(String),
}

impl Sex {
    /// Parse a header value
    /// Accepts full words and single-letter abbreviations in any case
    pub fn from_string(s: &str) -> Self {
        match s.trim() {
            "Male" | "male" | "MALE" | "M" | "m" => Sex::Male,
            "Female" | "female" | "FEMALE" | "F" | "f" => Sex::Female,
            "Unknown" | "unknown" | "" => Sex::Unknown,
            other => Sex::Other(other.to_string()),
        }
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Unknown => "Unknown",
            Sex::Other(value) => value.as_str(),
        }
    }
}

/// Encoded demographics: `[age_known, age / 100, male, female, sex_known]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemographicVector(pub [f32; DEMOGRAPHIC_FEATURES]);

impl DemographicVector {
    /// Feature values as a slice
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Single-batch tensor of shape (1, DEMOGRAPHIC_FEATURES)
    pub fn to_tensor(&self) -> Array2<f32> {
        Array2::from_shape_fn((1, DEMOGRAPHIC_FEATURES), |(_, j)| self.0[j])
    }
}

/// Encode age and sex into a demographic vector
/// Ages below zero are treated as unknown; unrecognised sex values encode as unknown
pub fn encode_demographics(age: i32, sex: &Sex) -> DemographicVector {
    let mut data = [0.0f32; DEMOGRAPHIC_FEATURES];

    if age >= 0 {
        data[0] = 1.0;
        data[1] = age as f32 / 100.0;
    }

    match sex {
        Sex::Male => {
            data[2] = 1.0;
            data[4] = 1.0;
        }
        Sex::Female => {
            data[3] = 1.0;
            data[4] = 1.0;
        }
        Sex::Unknown | Sex::Other(_) => {}
    }

    DemographicVector(data)
}
