// Pipeline configuration
// Signal, windowing and compute settings, loaded from JSON with defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ensemble::WindowingPolicy;
use crate::model::ComputeConfig;
use crate::signal::ResampleMethod;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// File name of the per-user config
pub const CONFIG_FILE: &str = "config.json";

/// Settings shared by every record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Logits per model and length of every label vector
    pub num_classes: usize,

    /// ECG leads the models expect
    pub in_channels: usize,

    /// Sampling rate every record is resampled to (Hz)
    pub target_fs: u32,

    /// Window length in samples at `target_fs`
    pub win_length: usize,

    /// Nominal overlap between consecutive windows
    pub overlap: usize,

    pub resample_method: ResampleMethod,
    pub windowing: WindowingPolicy,
    pub compute: ComputeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            num_classes: 24,
            in_channels: 12,
            target_fs: 257,
            win_length: 4096,
            overlap: 256,
            resample_method: ResampleMethod::Linear,
            windowing: WindowingPolicy::default(),
            compute: ComputeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Check the windowing arithmetic is well defined
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.win_length == 0 {
            return Err(ConfigError::Invalid("win_length must be positive".to_string()));
        }
        if self.overlap >= self.win_length {
            return Err(ConfigError::Invalid(format!(
                "overlap ({}) must be smaller than win_length ({})",
                self.overlap, self.win_length
            )));
        }
        if self.target_fs == 0 {
            return Err(ConfigError::Invalid("target_fs must be positive".to_string()));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::Invalid("num_classes must be positive".to_string()));
        }
        if self.in_channels == 0 {
            return Err(ConfigError::Invalid("in_channels must be positive".to_string()));
        }
        Ok(())
    }

    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// Per-user config location, e.g. `~/.config/cardiolabel/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cardiolabel").join(CONFIG_FILE))
}

/// Load config from `path`, else from the per-user file if it exists, else defaults
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => path,
            None => {
                log::debug!("No config file found, using defaults");
                return Ok(PipelineConfig::default());
            }
        },
    };

    log::info!("Loading config from {:?}", path);
    let data = fs::read(&path)?;
    PipelineConfig::from_json_bytes(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{Accumulation, FirstWindow};
    use crate::model::Device;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.num_classes, 24);
        assert_eq!(config.target_fs, 257);
        assert_eq!(config.win_length, 4096);
        assert_eq!(config.overlap, 256);
        assert_eq!(config.windowing.first_window, FirstWindow::FullSignal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = br#"{"win_length": 2048, "windowing": {"accumulation": "uniform"}, "compute": {"device": {"cuda": 1}}}"#;
        let config = PipelineConfig::from_json_bytes(json).unwrap();

        assert_eq!(config.win_length, 2048);
        assert_eq!(config.overlap, 256);
        assert_eq!(config.windowing.accumulation, Accumulation::Uniform);
        assert_eq!(config.windowing.first_window, FirstWindow::FullSignal);
        assert_eq!(config.compute.device, Device::Cuda(1));
        assert_eq!(config.compute.intra_threads, 1);
    }

    #[test]
    fn test_validation() {
        let config = PipelineConfig {
            overlap: 4096,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = PipelineConfig {
            target_fs: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(PipelineConfig::from_json_bytes(br#"{"num_classes": 0}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");

        let config = PipelineConfig {
            target_fs: 500,
            resample_method: ResampleMethod::Fourier,
            ..PipelineConfig::default()
        };
        std::fs::write(&path, config.to_json_bytes().unwrap()).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_config(Some(Path::new("/no/such/config.json")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
