// Cardiolabel - windowed ensemble inference for 12-lead ECG
// Module declarations

pub mod classify;
pub mod commands;
pub mod config;
pub mod ensemble;
pub mod model;
pub mod pipeline;
pub mod signal;

pub use classify::{ClassTaxonomy, InferenceResult, LabelSpace, ThresholdVector};
pub use config::{load_config, PipelineConfig};
pub use ensemble::{run_ensemble, WindowingPolicy};
pub use model::{load_model, Architecture, ComputeConfig, Device, EcgModel};
pub use pipeline::{PredictError, Predictor};
pub use signal::{load_record, EcgRecord, RecordHeader};
