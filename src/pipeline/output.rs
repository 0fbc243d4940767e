// Prediction output
// Per-record challenge CSV and JSON reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::classify::{ClassDecision, InferenceResult};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which files to write per record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Both,
}

impl OutputFormat {
    pub fn writes_csv(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    pub fn writes_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "both" => Ok(OutputFormat::Both),
            _ => Err(format!("Unknown output format '{}'. Expected: csv, json, both", s)),
        }
    }
}

/// Checkpoint that contributed to a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub file_name: String,
    pub accuracy: Option<f64>,
    pub sha256: String,
}

/// Full JSON report for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordReport {
    pub record: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub result: InferenceResult,

    pub decisions: Vec<ClassDecision>,
    pub checkpoints: Vec<CheckpointInfo>,
}

/// Challenge CSV body: `#record`, class codes, labels, scores
pub fn format_challenge_csv(record: &str, result: &InferenceResult) -> String {
    let classes = result.classes.join(",");
    let labels = result
        .labels
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let scores = result
        .scores
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",");

    format!("#{}\n{}\n{}\n{}\n", record, classes, labels, scores)
}

/// Write `<dir>/<record>.csv`
pub fn write_challenge_csv(dir: &Path, record: &str, result: &InferenceResult) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.csv", record));
    fs::write(&path, format_challenge_csv(record, result))?;
    Ok(path)
}

/// Write `<dir>/<record>.json`
pub fn write_json_report(dir: &Path, report: &RecordReport) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", report.record));
    fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    Ok(path)
}
