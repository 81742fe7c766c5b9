// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Structured configuration, loaded from YAML and validated at start-up.
//! Live overrides round-trip back to the same file on a `persist` request.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub primary: PathBuf,
    pub fallback: PathBuf,
    pub read_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsConfig {
    pub sizes: Vec<usize>,
    pub chunk_bits: usize,
    pub analysis_interval_ms: u64,
    pub history_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub gdi_z: f64,
    pub sustained_z: f64,
    pub sustained_ticks: u32,
    pub fdr_q: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    pub snapshot_count: usize,
    pub usb_mount: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub snapshot_dir: PathBuf,
    pub snapshot_bits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_csv: Option<PathBuf>,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub windows: WindowsConfig,
    pub alert: AlertConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.windows.sizes.is_empty() || self.windows.sizes.iter().any(|&s| s == 0) {
            return Err(ConfigError::InvalidField {
                field: "windows.sizes",
                reason: "must be a non-empty list of positive integers".to_string(),
            });
        }
        if self.windows.chunk_bits == 0 {
            return Err(ConfigError::InvalidField {
                field: "windows.chunk_bits",
                reason: "must be positive".to_string(),
            });
        }
        if self.windows.analysis_interval_ms == 0 {
            return Err(ConfigError::InvalidField {
                field: "windows.analysis_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.source.read_bytes == 0 {
            return Err(ConfigError::InvalidField {
                field: "source.read_bytes",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Serialises the current (possibly live-reconfigured) document back
    /// to the path it was loaded from.
    pub fn persist(&self, path: &Path) -> Result<(), crate::error::PersistError> {
        let text = serde_yaml::to_string(self).map_err(|source| crate::error::PersistError::Config {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;
        std::fs::write(path, text).map_err(|source| crate::error::PersistError::Config {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })
    }
}
