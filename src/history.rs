// src/history.rs
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::HistoryError;
use crate::session::SessionRecord;

/// Number of sessions shown in the "recent sessions" list.
pub const RECENT_SESSIONS: usize = 5;

/// Append-only list of completed sessions.
pub trait SessionStore {
    fn append(&mut self, record: SessionRecord) -> Result<(), HistoryError>;
    fn load_all(&self) -> Result<Vec<SessionRecord>, HistoryError>;
    fn clear(&mut self) -> Result<(), HistoryError>;
}

/// Keeps the whole history as one JSON array on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_all(&self, records: &[SessionRecord]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }
}

impl SessionStore for JsonFileStore {
    fn append(&mut self, record: SessionRecord) -> Result<(), HistoryError> {
        let mut records = self.load_all()?;
        records.push(record);
        self.write_all(&records)?;
        debug!(path = %self.path.display(), total = records.len(), "Appended session");
        Ok(())
    }

    /// A missing file is an empty history; so is a corrupt one.
    fn load_all(&self) -> Result<Vec<SessionRecord>, HistoryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Session history unreadable, starting fresh");
                Ok(Vec::new())
            }
        }
    }

    fn clear(&mut self) -> Result<(), HistoryError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(self.io_error(e)),
            _ => Ok(()),
        }
    }
}

/// Totals across all stored sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_sessions: usize,
    pub average_score: u8,
    pub total_seconds: u64,
    /// Newest first.
    pub recent: Vec<SessionRecord>,
}

impl ProgressSummary {
    pub fn from_records(records: &[SessionRecord]) -> Self {
        let total_sessions = records.len();
        let average_score = if total_sessions == 0 {
            0
        } else {
            let sum: u64 = records.iter().map(|r| u64::from(r.stats.average_score)).sum();
            (sum as f64 / total_sessions as f64).round() as u8
        };
        let total_seconds = records.iter().map(|r| r.stats.duration_seconds).sum();
        let recent = records.iter().rev().take(RECENT_SESSIONS).cloned().collect();

        Self {
            total_sessions,
            average_score,
            total_seconds,
            recent,
        }
    }
}

/// `"{minutes}m {seconds}s"`.
pub fn format_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

#[derive(Debug, Serialize)]
struct SessionRow<'a> {
    id: String,
    timestamp: String,
    posture_type: &'a str,
    duration_seconds: u64,
    average_score: u8,
    poor_posture_seconds: u64,
}

pub fn export_csv(records: &[SessionRecord], path: impl AsRef<Path>) -> Result<PathBuf, HistoryError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let file = File::create(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = Writer::from_writer(file);

    for record in records {
        writer.serialize(SessionRow {
            id: record.id.to_string(),
            timestamp: record.timestamp.to_rfc3339(),
            posture_type: &record.posture_type,
            duration_seconds: record.stats.duration_seconds,
            average_score: record.stats.average_score,
            poor_posture_seconds: record.stats.poor_posture_seconds,
        })?;
    }

    writer.flush().map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}
