// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Error kinds shared across the pipeline, storage, and CLI layers.

use std::path::PathBuf;

/// A bit source failed to produce a chunk.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open entropy device {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("read from {path:?} returned no data")]
    Empty { path: PathBuf },
    #[error("read from {path:?} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration failed to load or validate. Fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config field {field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Persisting a snapshot, CSV row, or config override failed. Logged, not fatal.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write snapshot to {path:?}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append CSV row to {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist config to {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
}

/// USB export failed. Reported through the export result, not fatal.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to create export directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Root error type for callers that need to unify the above (the CLI's
/// top-level `main`, primarily).
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
}
