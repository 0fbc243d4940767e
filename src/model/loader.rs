// Model loader
// Discovers checkpoints, picks the best (or requested) one and builds the ensemble

use ndarray::{ArrayView2, ArrayView3};
use std::fs;
use std::path::Path;

use crate::classify::threshold;
use crate::model::architecture::Architecture;
use crate::model::checkpoint::{fingerprint, Checkpoint};
use crate::model::device::ComputeConfig;
use crate::model::{EcgModel, ModelError};

/// A model plus the checkpoint it was loaded from
pub struct LoadedModel {
    pub model: Box<dyn EcgModel>,
    pub checkpoint: Checkpoint,
    /// SHA-256 of the checkpoint file
    pub sha256: String,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("architecture", &self.model.architecture())
            .field("checkpoint", &self.checkpoint)
            .field("sha256", &self.sha256)
            .finish()
    }
}

impl EcgModel for LoadedModel {
    fn forward(
        &self,
        window: ArrayView3<'_, f32>,
        demographics: ArrayView2<'_, f32>,
    ) -> Result<Vec<f32>, ModelError> {
        self.model.forward(window, demographics)
    }

    fn architecture(&self) -> Architecture {
        self.model.architecture()
    }
}

/// List checkpoint files in `model_dir` ending with `suffix`, sorted by path
///
/// The threshold artifact shares the model directory and is never a checkpoint.
pub fn discover_checkpoints(model_dir: &Path, suffix: &str) -> Result<Vec<Checkpoint>, ModelError> {
    let mut checkpoints = Vec::new();

    for entry in fs::read_dir(model_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.ends_with(suffix) && name != threshold::DEFAULT_FILE_NAME
            })
            .unwrap_or(false);
        if matches {
            checkpoints.push(Checkpoint::new(path, suffix));
        }
    }

    checkpoints.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(checkpoints)
}

/// Choose which checkpoints to load
///
/// Without `test_model`, the single checkpoint with the highest encoded
/// accuracy wins (first on ties). With `test_model`, only that file is used;
/// if it was not discovered the error is logged and nothing is selected.
pub fn select_checkpoints(checkpoints: &[Checkpoint], test_model: Option<&str>) -> Vec<Checkpoint> {
    match test_model {
        None => {
            let mut best: Option<(&Checkpoint, f64)> = None;
            for checkpoint in checkpoints {
                match checkpoint.accuracy {
                    Some(accuracy) => {
                        if best.map_or(true, |(_, top)| accuracy > top) {
                            best = Some((checkpoint, accuracy));
                        }
                    }
                    None => log::warn!(
                        "Skipping checkpoint without an encoded accuracy: {:?}",
                        checkpoint.path
                    ),
                }
            }

            let accuracies: Vec<Option<f64>> = checkpoints.iter().map(|c| c.accuracy).collect();
            log::info!("Model accuracy: {:?}", accuracies);

            match best {
                Some((checkpoint, _)) => vec![checkpoint.clone()],
                None => {
                    log::error!("No checkpoint with an encoded accuracy was found");
                    Vec::new()
                }
            }
        }
        Some(name) => match checkpoints.iter().find(|c| c.file_name() == name) {
            Some(checkpoint) => vec![checkpoint.clone()],
            None => {
                log::error!("Model {} not found in the model list.", name);
                Vec::new()
            }
        },
    }
}

/// Load the ensemble for `architecture` from `model_dir`
///
/// An unknown architecture name is an error. A missing `test_model` is not:
/// it yields an empty ensemble, which inference rejects.
pub fn load_model(
    model_dir: &Path,
    architecture: &str,
    test_model: Option<&str>,
    in_channels: usize,
    out_channels: usize,
    compute: &ComputeConfig,
) -> Result<Vec<LoadedModel>, ModelError> {
    let architecture: Architecture = architecture.parse()?;
    let checkpoints = discover_checkpoints(model_dir, architecture.checkpoint_suffix())?;

    log::info!(
        "Model list: {:?}",
        checkpoints.iter().map(|c| c.file_name()).collect::<Vec<_>>()
    );

    let selected = select_checkpoints(&checkpoints, test_model);
    log::info!(
        "Model path: {:?}",
        selected.iter().map(|c| &c.path).collect::<Vec<_>>()
    );

    let mut models = Vec::with_capacity(selected.len());
    for checkpoint in selected {
        let sha256 = fingerprint(&checkpoint.path)?;
        let model = architecture.instantiate(&checkpoint.path, in_channels, out_channels, compute)?;

        log::info!(
            "Loaded {} checkpoint {} (accuracy {:?}, sha256 {}) on {}",
            architecture,
            checkpoint.file_name(),
            checkpoint.accuracy,
            sha256,
            compute.device
        );

        models.push(LoadedModel {
            model,
            checkpoint,
            sha256,
        });
    }

    Ok(models)
}
