// Ensemble inference module
// Window tiling and per-model, per-window probability accumulation

pub mod runner;
pub mod tiling;

pub use runner::{run_ensemble, sigmoid, Accumulation, EnsembleError, WindowingPolicy};
pub use tiling::{patch_number, stride, FirstWindow, WindowPlan};
