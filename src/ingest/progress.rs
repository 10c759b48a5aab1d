//! Resumable ingestion progress
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::IngestError;

/// A document that produced no stored chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
    pub time: DateTime<Utc>,
}

/// Progress file contents
///
/// Documents listed in `processed_files` are skipped on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestProgress {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub processed_files: Vec<String>,
    #[serde(default)]
    pub failed_files: Vec<FailedFile>,
    #[serde(default)]
    pub total_chunks: usize,
    #[serde(default)]
    pub last_checkpoint: Option<DateTime<Utc>>,
}

impl Default for IngestProgress {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            processed_files: Vec::new(),
            failed_files: Vec::new(),
            total_chunks: 0,
            last_checkpoint: None,
        }
    }
}

impl IngestProgress {
    /// Load saved progress; a missing or unreadable file starts fresh
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<Self>(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(progress) => {
                tracing::info!(
                    "Loaded progress: {} files already processed",
                    progress.processed_files.len()
                );
                progress
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable progress file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Stamp a checkpoint and write the file
    pub fn save(&mut self, path: &Path) -> Result<(), IngestError> {
        self.last_checkpoint = Some(Utc::now());
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::Progress(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_processed(&self, path: &str) -> bool {
        self.processed_files.iter().any(|p| p == path)
    }

    pub fn mark_processed(&mut self, path: String, chunks: usize) {
        self.processed_files.push(path);
        self.total_chunks += chunks;
    }

    pub fn mark_failed(&mut self, path: String, reason: impl Into<String>) {
        self.failed_files.push(FailedFile {
            path,
            reason: reason.into(),
            time: Utc::now(),
        });
    }
}
