// Record predictor
// Signal + header in, labels + scores out, using one loaded ensemble

use ndarray::{Array1, ArrayView2};
use std::path::Path;
use thiserror::Error;

use crate::classify::{aggregate, decide, ClassDecision, InferenceResult, LabelSpace, LabelSpaceError};
use crate::config::{ConfigError, PipelineConfig};
use crate::ensemble::{run_ensemble, EnsembleError};
use crate::model::{load_model, EcgModel, LoadedModel, ModelError};
use crate::signal::{encode_demographics, prepare_window_tensor, RecordHeader, SignalError};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),

    #[error("Label space error: {0}")]
    LabelSpace(#[from] LabelSpaceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Expected {expected} leads, record has {found}")]
    ChannelMismatch { expected: usize, found: usize },
}

/// Read-only inference state shared by every record of a run
pub struct Predictor<M: EcgModel = LoadedModel> {
    config: PipelineConfig,
    label_space: LabelSpace,
    models: Vec<M>,
}

impl Predictor<LoadedModel> {
    /// Load the ensemble for `architecture` from `model_dir`
    pub fn load(
        config: PipelineConfig,
        label_space: LabelSpace,
        model_dir: &Path,
        architecture: &str,
        test_model: Option<&str>,
    ) -> Result<Self, PredictError> {
        config.validate()?;
        let models = load_model(
            model_dir,
            architecture,
            test_model,
            config.in_channels,
            config.num_classes,
            &config.compute,
        )?;
        Self::new(config, label_space, models)
    }
}

impl<M: EcgModel> Predictor<M> {
    /// Bundle an ensemble with its label space
    ///
    /// An empty ensemble is accepted here and rejected on the first record.
    pub fn new(config: PipelineConfig, label_space: LabelSpace, models: Vec<M>) -> Result<Self, PredictError> {
        config.validate()?;
        if label_space.len() != config.num_classes {
            return Err(LabelSpaceError::Misaligned {
                taxonomy: label_space.len(),
                thresholds: label_space.thresholds().len(),
                num_classes: config.num_classes,
            }
            .into());
        }
        if models.is_empty() {
            log::warn!("Predictor created with an empty ensemble");
        }

        Ok(Predictor {
            config,
            label_space,
            models,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn label_space(&self) -> &LabelSpace {
        &self.label_space
    }

    pub fn models(&self) -> &[M] {
        &self.models
    }

    /// Ensemble-mean probabilities for one record
    pub fn probabilities(&self, signal: ArrayView2<'_, f32>, header: &RecordHeader) -> Result<Array1<f32>, PredictError> {
        if signal.nrows() != self.config.in_channels {
            return Err(PredictError::ChannelMismatch {
                expected: self.config.in_channels,
                found: signal.nrows(),
            });
        }

        let demographics = encode_demographics(header.age, &header.sex).to_tensor();
        let tensor = prepare_window_tensor(
            signal,
            self.config.win_length,
            header.sampling_frequency as f64,
            self.config.target_fs as f64,
            self.config.resample_method,
        )?;

        let probs = run_ensemble(
            tensor.view(),
            demographics.view(),
            &self.models,
            self.config.win_length,
            self.config.overlap,
            self.config.windowing,
            self.config.num_classes,
        )?;

        Ok(probs)
    }

    /// Labels, scores and classes for one record
    pub fn run_classifier(&self, signal: ArrayView2<'_, f32>, header: &RecordHeader) -> Result<InferenceResult, PredictError> {
        let probs = self.probabilities(signal, header)?;
        let scores = probs.to_vec();
        Ok(aggregate(&scores, &self.label_space)?)
    }

    /// Same as `run_classifier`, plus the per-class decision breakdown
    pub fn run_with_decisions(
        &self,
        signal: ArrayView2<'_, f32>,
        header: &RecordHeader,
    ) -> Result<(InferenceResult, Vec<ClassDecision>), PredictError> {
        let probs = self.probabilities(signal, header)?;
        let scores = probs.to_vec();
        let decisions = decide(&scores, &self.label_space)?;
        let result = aggregate(&scores, &self.label_space)?;
        Ok((result, decisions))
    }
}
