// Signal processing module
// Handles ECG record ingestion, header parsing, resampling and window preparation

pub mod demographics;
pub mod header;
pub mod ingest;
pub mod resample;
pub mod window;

pub use demographics::{encode_demographics, DemographicVector, Sex, DEMOGRAPHIC_FEATURES};
pub use header::{HeaderError, RecordHeader};
pub use ingest::{load_record, read_mat_variable, EcgRecord, SignalError};
pub use resample::{resample, ResampleMethod};
pub use window::{pad_to_window, prepare_window_tensor};
