// Compute device selection
// Passed explicitly to the loader instead of being picked up from process-wide state

use serde::{Deserialize, Serialize};

/// Where model inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA device by ordinal, with host fallback
    Cuda(usize),
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            _ => match lower.strip_prefix("cuda:") {
                Some(ordinal) => ordinal
                    .parse()
                    .map(Device::Cuda)
                    .map_err(|_| format!("Invalid CUDA ordinal in '{}'", s)),
                None => Err(format!("Unknown device '{}'. Expected: cpu, cuda, cuda:N", s)),
            },
        }
    }
}

/// Compute settings shared by every model in an ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub device: Device,

    /// Threads a single forward pass may use
    pub intra_threads: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        ComputeConfig {
            device: Device::Cpu,
            intra_threads: 1,
        }
    }
}
