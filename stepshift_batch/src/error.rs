// Error types for the batch converter.
//
// `ConfigError` and the core crate's pad, graph, and fallback errors are
// startup failures: the binary exits with status 1. `SongError` fails a
// single song file; the scheduler logs it and carries on with the rest.

use std::path::PathBuf;
use stepshift_core::error::{FallbackError, GraphError, PadError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid regex in {field}: {source}")]
    InvalidRegex {
        field: String,
        source: regex::Error,
    },

    #[error("Unknown expressed chart config \"{0}\"")]
    UnknownExpressedConfig(String),

    #[error("Unknown performed chart config \"{0}\"")]
    UnknownPerformedConfig(String),

    #[error("Invalid log level \"{0}\"")]
    InvalidLogLevel(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SongError {
    #[error("Failed to read song {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse song {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize song {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write song {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pad(#[from] PadError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Fallbacks(#[from] FallbackError),

    #[error(transparent)]
    Song(#[from] SongError),

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to install logger: {0}")]
    Logger(String),
}
