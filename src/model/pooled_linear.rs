// Pooled linear classifier
// Per-lead mean/std pooling over time, concatenated with demographics, into one dense layer

use ndarray::{s, Array1, Array2, ArrayView2, ArrayView3};

use crate::model::architecture::Architecture;
use crate::model::checkpoint::{LoadReport, StateDict};
use crate::model::{EcgModel, ModelError};
use crate::signal::demographics::DEMOGRAPHIC_FEATURES;

const WEIGHT_KEY: &str = "weight";
const BIAS_KEY: &str = "bias";

/// Dense layer over pooled lead statistics
///
/// Feature layout: `[mean_0, std_0, mean_1, std_1, ..., demographics...]`.
/// Works on any window length, including the full-record first window.
#[derive(Debug, Clone)]
pub struct PooledLinear {
    in_channels: usize,
    out_channels: usize,
    /// Shape (out_channels, in_features)
    weight: Array2<f32>,
    /// Shape (out_channels,)
    bias: Array1<f32>,
}

impl PooledLinear {
    /// Create a zero-initialised model
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        let in_features = Self::feature_count(in_channels);
        PooledLinear {
            in_channels,
            out_channels,
            weight: Array2::zeros((out_channels, in_features)),
            bias: Array1::zeros(out_channels),
        }
    }

    /// Create a model from explicit parameters
    pub fn from_parameters(
        in_channels: usize,
        weight: Array2<f32>,
        bias: Array1<f32>,
    ) -> Result<Self, ModelError> {
        let out_channels = bias.len();
        let expected = [out_channels, Self::feature_count(in_channels)];
        if weight.shape() != expected {
            return Err(ModelError::ShapeMismatch {
                key: WEIGHT_KEY.to_string(),
                expected: expected.to_vec(),
                found: weight.shape().to_vec(),
            });
        }
        Ok(PooledLinear {
            in_channels,
            out_channels,
            weight,
            bias,
        })
    }

    /// Number of input features for a lead count
    pub fn feature_count(in_channels: usize) -> usize {
        2 * in_channels + DEMOGRAPHIC_FEATURES
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Copy matching tensors from a state dict
    /// Missing and unexpected keys are reported, shape mismatches fail
    pub fn load_state_dict(&mut self, state_dict: &StateDict) -> Result<LoadReport, ModelError> {
        let mut report = LoadReport::default();

        match state_dict.get(WEIGHT_KEY) {
            Some(tensor) => {
                let expected = self.weight.shape().to_vec();
                if tensor.shape != expected {
                    return Err(ModelError::ShapeMismatch {
                        key: WEIGHT_KEY.to_string(),
                        expected,
                        found: tensor.shape.clone(),
                    });
                }
                self.weight = Array2::from_shape_vec(self.weight.raw_dim(), tensor.data.clone())
                    .map_err(|e| ModelError::CheckpointParse(e.to_string()))?;
            }
            None => report.missing_keys.push(WEIGHT_KEY.to_string()),
        }

        match state_dict.get(BIAS_KEY) {
            Some(tensor) => {
                if tensor.shape != [self.out_channels] {
                    return Err(ModelError::ShapeMismatch {
                        key: BIAS_KEY.to_string(),
                        expected: vec![self.out_channels],
                        found: tensor.shape.clone(),
                    });
                }
                self.bias = Array1::from(tensor.data.clone());
            }
            None => report.missing_keys.push(BIAS_KEY.to_string()),
        }

        report.unexpected_keys = state_dict
            .tensors
            .keys()
            .filter(|k| k.as_str() != WEIGHT_KEY && k.as_str() != BIAS_KEY)
            .cloned()
            .collect();

        Ok(report)
    }

    /// Pooled feature vector for one window
    fn features(&self, window: ArrayView3<'_, f32>, demographics: ArrayView2<'_, f32>) -> Array1<f32> {
        let mut features = Array1::<f32>::zeros(Self::feature_count(self.in_channels));
        let length = window.shape()[2] as f64;

        for c in 0..self.in_channels {
            let lead = window.slice(s![0, c, ..]);
            let mean = lead.iter().map(|&v| v as f64).sum::<f64>() / length;
            let var = lead
                .iter()
                .map(|&v| {
                    let d = v as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / length;
            features[2 * c] = mean as f32;
            features[2 * c + 1] = var.sqrt() as f32;
        }

        let offset = 2 * self.in_channels;
        for j in 0..DEMOGRAPHIC_FEATURES {
            features[offset + j] = demographics[[0, j]];
        }

        features
    }
}

impl EcgModel for PooledLinear {
    fn forward(
        &self,
        window: ArrayView3<'_, f32>,
        demographics: ArrayView2<'_, f32>,
    ) -> Result<Vec<f32>, ModelError> {
        let shape = window.shape();
        if shape[0] != 1 || shape[1] != self.in_channels || shape[2] == 0 {
            return Err(ModelError::InvalidInput(format!(
                "expected window of shape (1, {}, L > 0), found {:?}",
                self.in_channels, shape
            )));
        }
        if demographics.shape() != [1, DEMOGRAPHIC_FEATURES] {
            return Err(ModelError::InvalidInput(format!(
                "expected demographics of shape (1, {}), found {:?}",
                DEMOGRAPHIC_FEATURES,
                demographics.shape()
            )));
        }

        let features = self.features(window, demographics);
        let logits = self.weight.dot(&features) + &self.bias;
        Ok(logits.to_vec())
    }

    fn architecture(&self) -> Architecture {
        Architecture::PooledLinear
    }
}
