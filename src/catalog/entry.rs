//! # Log Entry
//!
//! Descriptor of one log file stored on the vehicle and its retrieval state.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::fmt;

/// Earliest year a vehicle clock is trusted; older stamps mean "never synced"
pub const MIN_VALID_YEAR: i32 = 2010;

/// Retrieval state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Known to exist (from `num_logs`) but not listed yet
    Pending,
    /// Listed and available for download
    Available,
    /// Queued for download
    Waiting,
    Downloading,
    Downloaded,
    /// Listing or file creation failed
    Failed,
    /// Gave up after repeated timeouts
    TimedOut,
    Canceled,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EntryStatus::Pending => "Pending",
            EntryStatus::Available => "Available",
            EntryStatus::Waiting => "Waiting",
            EntryStatus::Downloading => "Downloading",
            EntryStatus::Downloaded => "Downloaded",
            EntryStatus::Failed => "Error",
            EntryStatus::TimedOut => "Timed Out",
            EntryStatus::Canceled => "Canceled",
        };
        f.write_str(text)
    }
}

/// One remote log file
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Catalog id, zero based regardless of firmware numbering
    pub id: u16,

    /// Creation time; `None` when the vehicle reported 0
    pub time_utc: Option<DateTime<Utc>>,

    /// Declared size in bytes
    pub size_bytes: u32,

    /// Total log count reported alongside this entry
    pub num_logs: u16,

    /// True once a listing response for this id arrived
    pub received: bool,

    /// User intent to download
    pub selected: bool,

    pub status: EntryStatus,

    /// Free-form status line (e.g. progress and rate while downloading)
    pub status_text: String,
}

impl LogEntry {
    /// Entry built from a listing response
    pub fn listed(id: u16, time_utc: u32, size_bytes: u32, num_logs: u16) -> Self {
        Self {
            id,
            time_utc: timestamp_from_secs(time_utc),
            size_bytes,
            num_logs,
            received: true,
            selected: false,
            status: EntryStatus::Available,
            status_text: EntryStatus::Available.to_string(),
        }
    }

    /// Placeholder for an id the vehicle announced but never described
    pub fn placeholder(id: u16, num_logs: u16) -> Self {
        Self {
            id,
            time_utc: None,
            size_bytes: 0,
            num_logs,
            received: false,
            selected: false,
            status: EntryStatus::Pending,
            status_text: EntryStatus::Pending.to_string(),
        }
    }

    pub fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
        self.status_text = status.to_string();
    }

    /// Timestamp if the vehicle clock looked synced when the log was created
    pub fn valid_time(&self) -> Option<DateTime<Utc>> {
        self.time_utc.filter(|t| t.year() >= MIN_VALID_YEAR)
    }
}

fn timestamp_from_secs(secs: u32) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::from(secs), 0)
}
