// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors raised while loading posture profiles.
///
/// These are the only hard failures of the scoring engine and always surface
/// before the first frame is analyzed.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unknown posture type '{0}'")]
    UnknownPostureType(String),

    #[error("profile '{profile}': invalid {metric} threshold: {reason}")]
    InvalidThreshold {
        profile: String,
        metric: &'static str,
        reason: String,
    },

    #[error("profile registry is empty")]
    Empty,

    #[error("failed to parse posture profiles: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read posture profiles from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the session history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize session history: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to export session history as CSV: {0}")]
    Csv(#[from] csv::Error),
}
