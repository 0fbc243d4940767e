// Run tracing
// Append-only JSONL log of batch prediction progress

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stages of a batch run
pub mod stage {
    pub const LOAD_MODELS: &str = "load_models";
    pub const LOAD_RECORD: &str = "load_record";
    pub const INFERENCE: &str = "inference";
    pub const WRITE_OUTPUT: &str = "write_output";
    pub const RUN: &str = "run";
}

/// One line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// ISO 8601 timestamp
    pub timestamp: String,

    /// Batch run this entry belongs to
    pub run_id: Uuid,

    pub stage: String,

    /// Record being processed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,

    /// Fraction of the run completed [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(run_id: Uuid, stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            stage: stage.into(),
            record: None,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn for_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Writes trace entries for one run
pub struct TraceWriter {
    file_path: PathBuf,
    run_id: Uuid,
}

impl TraceWriter {
    /// Start a new run traced to `file_path`
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter {
            file_path,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Entry stamped with this run's id
    pub fn entry(&self, stage: &str, progress: f32, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, stage, progress, message)
    }

    /// Append an entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;

        Ok(())
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}
