//! # Download Manifest
//!
//! Appends one JSON line per finished entry to `manifest.jsonl` in the
//! download directory, so a batch can be audited after the fact.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::catalog::{EntryStatus, LogEntry};
use crate::error::Result;

/// Manifest file name inside the download directory
pub const MANIFEST_FILE_NAME: &str = "manifest.jsonl";

/// One manifest line
#[derive(Debug, Clone, Serialize)]
pub struct ManifestRecord {
    pub id: u16,
    pub size_bytes: u32,
    pub time_utc: Option<DateTime<Utc>>,
    pub status: EntryStatus,
    pub path: Option<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

impl ManifestRecord {
    pub fn new(entry: &LogEntry, status: EntryStatus, path: Option<PathBuf>) -> Self {
        Self {
            id: entry.id,
            size_bytes: entry.size_bytes,
            time_utc: entry.time_utc,
            status,
            path,
            finished_at: Utc::now(),
        }
    }
}

/// JSON Lines writer for one download directory
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
}

impl Manifest {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(MANIFEST_FILE_NAME),
        }
    }

    /// Append `record` as one line
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or written
    pub fn append(&self, record: &ManifestRecord) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
