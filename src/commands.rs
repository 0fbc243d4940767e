// Batch commands
// Entry points behind the CLI: predict records, list checkpoints, list classes

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{ClassTaxonomy, LabelSpace, ThresholdVector};
use crate::config::PipelineConfig;
use crate::model::{discover_checkpoints, select_checkpoints, Architecture};
use crate::pipeline::trace::stage;
use crate::pipeline::{
    write_challenge_csv, write_json_report, CheckpointInfo, OutputFormat, Predictor, RecordReport, TraceWriter,
};
use crate::signal::load_record;

/// Threshold artifact looked up in the model directory when none is given
pub use crate::classify::threshold::DEFAULT_FILE_NAME as DEFAULT_THRESHOLDS_FILE;

/// Extension of signal files picked up from an input directory
pub const RECORD_EXTENSION: &str = "mat";

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

type CommandResult<T> = Result<T, CommandError>;

// ==================== PREDICT ====================

#[derive(Debug, Clone)]
pub struct PredictOptions {
    /// A `.mat` record or a directory of them
    pub input: PathBuf,
    pub models: PathBuf,
    pub architecture: String,
    pub test_model: Option<String>,
    /// Defaults to `<models>/thresholds.json`
    pub thresholds: Option<PathBuf>,
    /// Defaults to the built-in class table
    pub taxonomy: Option<PathBuf>,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub trace: Option<PathBuf>,
    pub config: PipelineConfig,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub processed: usize,
    pub failed: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

/// Taxonomy from `taxonomy` (or built in) aligned with thresholds from `thresholds`
pub fn load_label_space(
    taxonomy: Option<&Path>,
    thresholds: &Path,
    num_classes: usize,
) -> CommandResult<LabelSpace> {
    let taxonomy = match taxonomy {
        Some(path) => ClassTaxonomy::from_csv_file(path)?,
        None => ClassTaxonomy::builtin(),
    };
    let thresholds = ThresholdVector::from_file(thresholds).map_err(|e| CommandError {
        message: format!("Failed to load thresholds {:?}: {}", thresholds, e),
    })?;

    Ok(LabelSpace::new(taxonomy, thresholds, num_classes)?)
}

/// Records to process: the file itself, or every `.mat` in the directory, sorted
pub fn collect_records(input: &Path) -> CommandResult<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(input).map_err(|e| CommandError {
        message: format!("Failed to read input {:?}: {}", input, e),
    })? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == RECORD_EXTENSION) {
            records.push(path);
        }
    }
    records.sort();
    Ok(records)
}

/// Run the ensemble over every input record and write one output per record
///
/// Record failures are logged and counted; the command fails if any record failed.
pub fn predict(options: &PredictOptions) -> CommandResult<BatchSummary> {
    options.config.validate()?;

    let tracer = options.trace.as_ref().map(|path| TraceWriter::new(path.clone()));
    let run_id = tracer.as_ref().map(|t| t.run_id()).unwrap_or_else(uuid::Uuid::new_v4);
    let trace = |stage: &str, progress: f32, record: Option<&str>, message: String, data: Option<Value>| {
        if let Some(tracer) = &tracer {
            let mut entry = tracer.entry(stage, progress, message);
            if let Some(record) = record {
                entry = entry.for_record(record);
            }
            if let Some(data) = data {
                entry = entry.with_data(data);
            }
            if let Err(e) = tracer.write(&entry) {
                log::warn!("Failed to write trace entry: {}", e);
            }
        }
    };

    let thresholds = options
        .thresholds
        .clone()
        .unwrap_or_else(|| options.models.join(DEFAULT_THRESHOLDS_FILE));
    let label_space = load_label_space(options.taxonomy.as_deref(), &thresholds, options.config.num_classes)?;

    trace(stage::LOAD_MODELS, 0.0, None, format!("Loading {} models", options.architecture), None);
    let predictor = Predictor::load(
        options.config.clone(),
        label_space,
        &options.models,
        &options.architecture,
        options.test_model.as_deref(),
    )?;

    let checkpoints: Vec<CheckpointInfo> = predictor
        .models()
        .iter()
        .map(|m| CheckpointInfo {
            file_name: m.checkpoint.file_name(),
            accuracy: m.checkpoint.accuracy,
            sha256: m.sha256.clone(),
        })
        .collect();

    let records = collect_records(&options.input)?;
    log::info!("Predicting {} records with {} models", records.len(), checkpoints.len());
    trace(stage::RUN, 0.0, None, format!("{} records", records.len()), None);

    let mut summary = BatchSummary {
        run_id: run_id.to_string(),
        processed: 0,
        failed: Vec::new(),
        outputs: Vec::new(),
    };

    for (i, path) in records.iter().enumerate() {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let started = i as f32 / records.len() as f32;
        let progress = (i + 1) as f32 / records.len() as f32;

        let outcome = (|| -> CommandResult<Vec<PathBuf>> {
            let record = load_record(path)?;
            trace(
                stage::LOAD_RECORD,
                started,
                Some(&name),
                format!("Loaded {} leads", record.channels()),
                Some(json!({
                    "samples": record.samples(),
                    "sampling_frequency": record.header.sampling_frequency,
                    "duration_secs": record.duration_secs(),
                })),
            );

            let (result, decisions) = predictor.run_with_decisions(record.signal.view(), &record.header)?;
            log::info!("{}: positive classes {:?}", record.name, result.positive_classes());

            let mut written = Vec::new();
            if options.format.writes_csv() {
                written.push(write_challenge_csv(&options.output, &record.name, &result)?);
            }
            if options.format.writes_json() {
                let report = RecordReport {
                    record: record.name.clone(),
                    run_id,
                    created_at: Utc::now(),
                    result,
                    decisions,
                    checkpoints: checkpoints.clone(),
                };
                written.push(write_json_report(&options.output, &report)?);
            }
            trace(
                stage::WRITE_OUTPUT,
                progress,
                Some(&name),
                format!("Wrote {} files", written.len()),
                Some(json!({ "outputs": &written })),
            );
            Ok(written)
        })();

        match outcome {
            Ok(written) => {
                summary.processed += 1;
                summary.outputs.extend(written);
                trace(stage::INFERENCE, progress, Some(&name), "Record labelled".to_string(), None);
            }
            Err(e) => {
                log::error!("Record {:?} failed: {}", path, e.message());
                trace(stage::INFERENCE, progress, Some(&name), format!("Failed: {}", e.message()), None);
                summary.failed.push(name);
            }
        }
    }

    trace(
        stage::RUN,
        1.0,
        None,
        format!("{} processed, {} failed", summary.processed, summary.failed.len()),
        None,
    );

    if !summary.failed.is_empty() {
        return Err(CommandError {
            message: format!(
                "{} of {} records failed: {}",
                summary.failed.len(),
                records.len(),
                summary.failed.join(", ")
            ),
        });
    }

    Ok(summary)
}

// ==================== CHECKPOINTS ====================

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointListing {
    pub file_name: String,
    pub accuracy: Option<f64>,
    pub selected: bool,
}

/// Discovered checkpoints for an architecture, marking the auto-selected one
pub fn list_checkpoints(models: &Path, architecture: &str) -> CommandResult<Vec<CheckpointListing>> {
    let architecture: Architecture = architecture.parse()?;
    let checkpoints = discover_checkpoints(models, architecture.checkpoint_suffix())?;
    let selected = select_checkpoints(&checkpoints, None);

    Ok(checkpoints
        .iter()
        .map(|c| CheckpointListing {
            file_name: c.file_name(),
            accuracy: c.accuracy,
            selected: selected.contains(c),
        })
        .collect())
}

// ==================== CLASSES ====================

#[derive(Debug, Clone, Serialize)]
pub struct ClassListing {
    pub index: usize,
    pub code: String,
    pub abbreviation: Option<String>,
}

/// Canonical class order
pub fn list_classes(taxonomy: Option<&Path>) -> CommandResult<Vec<ClassListing>> {
    let taxonomy = match taxonomy {
        Some(path) => ClassTaxonomy::from_csv_file(path)?,
        None => ClassTaxonomy::builtin(),
    };

    Ok(taxonomy
        .classes()
        .iter()
        .enumerate()
        .map(|(index, code)| ClassListing {
            index,
            code: code.clone(),
            abbreviation: taxonomy.abbreviation(code).map(str::to_string),
        })
        .collect())
}
