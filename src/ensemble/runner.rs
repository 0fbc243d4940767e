// Ensemble runner
// Forward passes over every window of every model, combined into one probability vector

use ndarray::{s, Array1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ensemble::tiling::{FirstWindow, WindowPlan};
use crate::model::{EcgModel, ModelError};

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("Ensemble is empty; no model was loaded")]
    EmptyEnsemble,

    #[error("Model {index} failed on window {window}: {source}")]
    Model {
        index: usize,
        window: usize,
        #[source]
        source: ModelError,
    },

    #[error("Model {index} produced {found} logits, expected {expected}")]
    LogitLength {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid input tensor: {0}")]
    InvalidInput(String),
}

/// How per-window probabilities are combined within one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulation {
    /// First window seeds the total, middle windows add, the last window adds
    /// and the total is divided by the window count
    #[default]
    Inherited,
    /// Plain mean over all windows
    Uniform,
}

/// Windowing behaviour of the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowingPolicy {
    pub first_window: FirstWindow,
    pub accumulation: Accumulation,
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Run every model over every window and average across the ensemble
///
/// `tensor` has shape `(1, channels, val_length)` with `val_length >= win_length`;
/// `demographics` has shape `(1, features)`. Returns `num_classes` probabilities.
pub fn run_ensemble<M: EcgModel>(
    tensor: ArrayView3<'_, f32>,
    demographics: ArrayView2<'_, f32>,
    models: &[M],
    win_length: usize,
    overlap: usize,
    policy: WindowingPolicy,
    num_classes: usize,
) -> Result<Array1<f32>, EnsembleError> {
    if models.is_empty() {
        return Err(EnsembleError::EmptyEnsemble);
    }
    if overlap >= win_length {
        return Err(EnsembleError::InvalidInput(format!(
            "overlap {} must be smaller than window length {}",
            overlap, win_length
        )));
    }

    let val_length = tensor.len_of(Axis(2));
    if val_length < win_length {
        return Err(EnsembleError::InvalidInput(format!(
            "signal of {} samples is shorter than the {}-sample window",
            val_length, win_length
        )));
    }

    let plan = WindowPlan::new(val_length, win_length, overlap, policy.first_window);
    log::debug!(
        "Tiling {} samples into {} windows (stride {:?})",
        val_length,
        plan.patch_number,
        plan.stride
    );

    let mut total = Array1::<f32>::zeros(num_classes);
    for (index, model) in models.iter().enumerate() {
        let probs = run_model(tensor, demographics, model, index, &plan, policy, num_classes)?;
        log::debug!("Model {} ({}) probabilities: {:?}", index, model.architecture(), probs);
        total += &probs;
    }

    Ok(total / models.len() as f32)
}

/// Combined probabilities of one model over all windows of `plan`
fn run_model<M: EcgModel>(
    tensor: ArrayView3<'_, f32>,
    demographics: ArrayView2<'_, f32>,
    model: &M,
    index: usize,
    plan: &WindowPlan,
    policy: WindowingPolicy,
    num_classes: usize,
) -> Result<Array1<f32>, EnsembleError> {
    let patch_number = plan.patch_number;
    let mut acc = Array1::<f32>::zeros(num_classes);

    for (i, range) in plan.windows.iter().enumerate() {
        let window = tensor.slice(s![.., .., range.clone()]);
        let logits = model
            .forward(window, demographics)
            .map_err(|source| EnsembleError::Model {
                index,
                window: i,
                source,
            })?;

        if logits.len() != num_classes {
            return Err(EnsembleError::LogitLength {
                index,
                expected: num_classes,
                found: logits.len(),
            });
        }

        let probs = Array1::from_iter(logits.into_iter().map(sigmoid));

        match policy.accumulation {
            Accumulation::Inherited => {
                if i == 0 {
                    acc = probs;
                } else if i == patch_number - 1 {
                    acc = (acc + &probs) / patch_number as f32;
                } else {
                    acc += &probs;
                }
            }
            Accumulation::Uniform => acc += &probs,
        }
    }

    if policy.accumulation == Accumulation::Uniform {
        acc /= patch_number as f32;
    }

    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Architecture;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};
    use std::sync::Mutex;

    /// Returns the same logit for every class
    struct ConstantModel(f32);

    impl EcgModel for ConstantModel {
        fn forward(&self, _: ArrayView3<'_, f32>, _: ArrayView2<'_, f32>) -> Result<Vec<f32>, ModelError> {
            Ok(vec![self.0; 3])
        }

        fn architecture(&self) -> Architecture {
            Architecture::PooledLinear
        }
    }

    /// Logit = mean of lead 0, remembers the window lengths it saw
    #[derive(Default)]
    struct MeanModel {
        seen: Mutex<Vec<usize>>,
    }

    impl EcgModel for MeanModel {
        fn forward(&self, window: ArrayView3<'_, f32>, _: ArrayView2<'_, f32>) -> Result<Vec<f32>, ModelError> {
            let lead = window.slice(s![0, 0, ..]);
            self.seen.lock().unwrap().push(lead.len());
            let mean = lead.sum() / lead.len() as f32;
            Ok(vec![mean; 3])
        }

        fn architecture(&self) -> Architecture {
            Architecture::PooledLinear
        }
    }

    struct FailingModel;

    impl EcgModel for FailingModel {
        fn forward(&self, _: ArrayView3<'_, f32>, _: ArrayView2<'_, f32>) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::InferenceError("boom".to_string()))
        }

        fn architecture(&self) -> Architecture {
            Architecture::PooledLinear
        }
    }

    fn demographics() -> Array2<f32> {
        Array2::zeros((1, 5))
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
    }

    #[test]
    fn test_empty_ensemble_is_an_error() {
        let tensor = Array3::<f32>::zeros((1, 2, 4096));
        let models: Vec<ConstantModel> = Vec::new();
        let result = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        );
        assert!(matches!(result, Err(EnsembleError::EmptyEnsemble)));
    }

    #[test]
    fn test_single_window_equals_single_pass() {
        let tensor = Array3::<f32>::from_elem((1, 2, 4096), 0.7);
        let models = vec![MeanModel::default()];
        let probs = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        )
        .unwrap();

        let direct = models[0].forward(tensor.view(), demographics().view()).unwrap();
        for (p, l) in probs.iter().zip(direct) {
            assert_relative_eq!(*p, sigmoid(l), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_inherited_windows_and_weights() {
        // Lead 0 is 0 over [0, 4096) and 1 over [4096, 8192)
        let tensor = Array3::<f32>::from_shape_fn((1, 1, 8192), |(_, _, t)| if t < 4096 { 0.0 } else { 1.0 });
        let models = vec![MeanModel::default()];
        let probs = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        )
        .unwrap();

        // Windows: full signal (mean 0.5), [2048, 6144) (mean 0.5), [4096, 8192) (mean 1)
        assert_eq!(*models[0].seen.lock().unwrap(), vec![8192, 4096, 4096]);
        let expected = (sigmoid(0.5) + sigmoid(0.5) + sigmoid(1.0)) / 3.0;
        assert_relative_eq!(probs[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_leading_first_window_policy() {
        let tensor = Array3::<f32>::from_shape_fn((1, 1, 8192), |(_, _, t)| if t < 4096 { 0.0 } else { 1.0 });
        let models = vec![MeanModel::default()];
        let policy = WindowingPolicy {
            first_window: FirstWindow::Leading,
            accumulation: Accumulation::Uniform,
        };
        let probs = run_ensemble(tensor.view(), demographics().view(), &models, 4096, 256, policy, 3).unwrap();

        assert_eq!(*models[0].seen.lock().unwrap(), vec![4096, 4096, 4096]);
        let expected = (sigmoid(0.0) + sigmoid(0.5) + sigmoid(1.0)) / 3.0;
        assert_relative_eq!(probs[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_inherited_two_windows_halves_the_sum() {
        let tensor = Array3::<f32>::zeros((1, 1, 5000));
        let models = vec![ConstantModel(0.0)];
        let probs = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        )
        .unwrap();
        assert_relative_eq!(probs[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_ensemble_mean_over_models() {
        let tensor = Array3::<f32>::zeros((1, 2, 4096));
        let models = vec![ConstantModel(10.0), ConstantModel(-10.0)];
        let probs = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        )
        .unwrap();

        for p in probs.iter() {
            assert_relative_eq!(*p, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_model_failure_propagates() {
        let tensor = Array3::<f32>::zeros((1, 2, 4096));
        let models: Vec<Box<dyn EcgModel>> = vec![Box::new(ConstantModel(0.0)), Box::new(FailingModel)];
        let result = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        );
        assert!(matches!(result, Err(EnsembleError::Model { index: 1, window: 0, .. })));
    }

    #[test]
    fn test_wrong_logit_length() {
        let tensor = Array3::<f32>::zeros((1, 2, 4096));
        let models = vec![ConstantModel(0.0)];
        let result = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            24,
        );
        assert!(matches!(
            result,
            Err(EnsembleError::LogitLength { expected: 24, found: 3, .. })
        ));
    }

    #[test]
    fn test_short_tensor_is_rejected() {
        let tensor = Array3::<f32>::zeros((1, 2, 100));
        let models = vec![ConstantModel(0.0)];
        let result = run_ensemble(
            tensor.view(),
            demographics().view(),
            &models,
            4096,
            256,
            WindowingPolicy::default(),
            3,
        );
        assert!(matches!(result, Err(EnsembleError::InvalidInput(_))));
    }

    #[test]
    fn test_policy_serde_defaults() {
        let policy: WindowingPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, WindowingPolicy::default());

        let policy: WindowingPolicy =
            serde_json::from_str(r#"{"first_window": "leading", "accumulation": "uniform"}"#).unwrap();
        assert_eq!(policy.first_window, FirstWindow::Leading);
        assert_eq!(policy.accumulation, Accumulation::Uniform);
    }
}
