// Pipeline module
// Record prediction, output writers and run tracing

pub mod output;
pub mod predictor;
pub mod trace;

pub use output::{
    format_challenge_csv, write_challenge_csv, write_json_report, CheckpointInfo, OutputError, OutputFormat,
    RecordReport,
};
pub use predictor::{PredictError, Predictor};
pub use trace::{read_trace_file, TraceEntry, TraceError, TraceWriter};
