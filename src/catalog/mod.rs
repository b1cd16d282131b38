//! # Entry Catalog Module
//!
//! Ordered collection of the vehicle's log entries, keyed by catalog id.
//!
//! This module handles:
//! - Upserting listing fragments and checking them for consistency
//! - Computing which ids are still missing from a listing
//! - Tracking user selection in ascending id order

pub mod entry;

pub use entry::{EntryStatus, LogEntry};

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::debug;

use crate::error::{LogDownloadError, Result};

/// Log entries reported by the vehicle during one listing session
#[derive(Debug, Default)]
pub struct EntryCatalog {
    entries: BTreeMap<u16, LogEntry>,
    num_logs: Option<u16>,
    last_log_num: Option<u16>,
}

impl EntryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refine the entry `id`
    ///
    /// Idempotent: applying the same fragment twice leaves the catalog as it
    /// was. Selection and download status of an existing entry survive a
    /// refinement. A fragment with `num_logs == 0` records an empty listing.
    ///
    /// # Errors
    ///
    /// Returns a protocol error, leaving the catalog untouched, if `num_logs`
    /// disagrees with an earlier fragment or `id` is outside `[0, num_logs)`.
    pub fn add_or_update(
        &mut self,
        id: u16,
        time_utc: u32,
        size_bytes: u32,
        num_logs: u16,
        last_log_num: u16,
    ) -> Result<()> {
        self.check_num_logs(num_logs)?;

        if num_logs > 0 && id >= num_logs {
            return Err(LogDownloadError::Protocol(format!(
                "log id {} out of range for {} logs",
                id, num_logs
            )));
        }

        self.num_logs = Some(num_logs);
        self.last_log_num = Some(last_log_num);

        if num_logs == 0 {
            return Ok(());
        }

        let fresh = LogEntry::listed(id, time_utc, size_bytes, num_logs);
        match self.entries.get_mut(&id) {
            Some(existing) if existing.received => {
                existing.time_utc = fresh.time_utc;
                existing.size_bytes = fresh.size_bytes;
            }
            Some(existing) => *existing = fresh,
            None => {
                debug!(id, size_bytes, "new log entry");
                self.entries.insert(id, fresh);
            }
        }

        Ok(())
    }

    /// Record the log count from a fragment that describes no entry
    ///
    /// # Errors
    ///
    /// Returns a protocol error if `num_logs` disagrees with an earlier fragment.
    pub fn announce(&mut self, num_logs: u16, last_log_num: u16) -> Result<()> {
        self.check_num_logs(num_logs)?;
        self.num_logs = Some(num_logs);
        self.last_log_num = Some(last_log_num);
        Ok(())
    }

    fn check_num_logs(&self, num_logs: u16) -> Result<()> {
        match self.num_logs {
            Some(known) if known != num_logs => Err(LogDownloadError::Protocol(format!(
                "num_logs changed from {} to {}",
                known, num_logs
            ))),
            _ => Ok(()),
        }
    }

    /// Ids in `[0, expected_count)` not listed yet, in ascending order
    ///
    /// Recomputed from the current contents on every call.
    pub fn entries_missing(&self, expected_count: u16) -> impl Iterator<Item = u16> + '_ {
        (0..expected_count).filter(move |id| !self.entries.get(id).is_some_and(|e| e.received))
    }

    /// Missing ids coalesced into contiguous inclusive runs
    pub fn missing_ranges(&self, expected_count: u16) -> Vec<RangeInclusive<u16>> {
        let mut runs: Vec<RangeInclusive<u16>> = Vec::new();
        for id in self.entries_missing(expected_count) {
            match runs.last_mut() {
                Some(run) if *run.end() + 1 == id => *run = *run.start()..=id,
                _ => runs.push(id..=id),
            }
        }
        runs
    }

    /// True once every announced id has been listed
    pub fn is_complete(&self) -> bool {
        match self.num_logs {
            Some(n) => self.entries_missing(n).next().is_none(),
            None => false,
        }
    }

    /// Add `Failed` placeholders for announced ids that never arrived
    pub fn mark_missing_failed(&mut self, expected_count: u16) -> Vec<u16> {
        let missing: Vec<u16> = self.entries_missing(expected_count).collect();
        for &id in &missing {
            let entry = self
                .entries
                .entry(id)
                .or_insert_with(|| LogEntry::placeholder(id, expected_count));
            entry.set_status(EntryStatus::Failed);
        }
        missing
    }

    /// Selected entries in ascending id order
    pub fn selected(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values().filter(|e| e.selected)
    }

    /// Lowest selected id
    pub fn next_selected(&self) -> Option<u16> {
        self.selected().next().map(|e| e.id)
    }

    /// Change the selection of a listed entry
    ///
    /// Returns false for unknown or never-listed ids.
    pub fn set_selected(&mut self, id: u16, selected: bool) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.received => {
                entry.selected = selected;
                true
            }
            _ => false,
        }
    }

    /// Select every listed entry; returns how many are selected
    pub fn select_all(&mut self) -> usize {
        let mut count = 0;
        for entry in self.entries.values_mut().filter(|e| e.received) {
            entry.selected = true;
            count += 1;
        }
        count
    }

    /// Deselect everything; returns the ids that were selected
    pub fn clear_selection(&mut self) -> Vec<u16> {
        let mut cleared = Vec::new();
        for entry in self.entries.values_mut().filter(|e| e.selected) {
            entry.selected = false;
            cleared.push(entry.id);
        }
        cleared
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.num_logs = None;
        self.last_log_num = None;
    }

    pub fn get(&self, id: u16) -> Option<&LogEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut LogEntry> {
        self.entries.get_mut(&id)
    }

    /// Entries in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Log count announced by the vehicle, once any fragment arrived
    pub fn num_logs(&self) -> Option<u16> {
        self.num_logs
    }

    pub fn last_log_num(&self) -> Option<u16> {
        self.last_log_num
    }
}
