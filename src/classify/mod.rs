// Classification module
// Class taxonomy, thresholds and the label decision rule

pub mod aggregate;
pub mod label_space;
pub mod taxonomy;
pub mod threshold;
pub mod types;

pub use aggregate::{aggregate, argmax, decide};
pub use label_space::{LabelSpace, LabelSpaceError};
pub use taxonomy::{ClassTaxonomy, EQUIVALENT_CLASSES, SCORED_CLASSES};
pub use threshold::ThresholdVector;
pub use types::{ClassDecision, InferenceResult};
