//! # Transfer Sessions
//!
//! Per-phase state owned by the engine: one listing, or one entry's download.

use std::ops::Range;
use tokio::time::Instant;

use super::output::LogFile;
use super::rate::{fraction, RateTracker};
use super::ranges::RangeSet;
use crate::error::Result;

/// State of one listing phase
#[derive(Debug, Default)]
pub struct ListingSession {
    /// Consecutive timeouts of the outstanding list request
    pub retries: u32,
    /// Catalog ids of the outstanding list request, inclusive
    pub outstanding: Option<(u16, u16)>,
    /// Set when an earlier listing was cut short; its fragments may still
    /// be in flight and carry an outdated log count
    pub after_interruption: bool,
}

impl ListingSession {
    pub fn new(after_interruption: bool) -> Self {
        Self {
            after_interruption,
            ..Self::default()
        }
    }
}

/// State of one entry's download
#[derive(Debug)]
pub struct DownloadSession {
    /// Catalog id of the entry
    pub id: u16,
    /// Declared size of the entry
    pub size: u32,
    pub file: LogFile,
    pub received: RangeSet,
    /// Byte range of the request in flight
    pub outstanding: Option<Range<u32>>,
    /// Consecutive timeouts of the outstanding request
    pub retries: u32,
    pub rate: RateTracker,
}

impl DownloadSession {
    pub fn new(id: u16, file: LogFile, now: Instant) -> Self {
        Self {
            id,
            size: file.size(),
            file,
            received: RangeSet::new(),
            outstanding: None,
            retries: 0,
            rate: RateTracker::new(now),
        }
    }

    /// Store a payload received at `offset`
    ///
    /// Bytes past the declared size are dropped. Returns how many bytes
    /// were not held before; only those count towards the transfer rate.
    pub fn record(&mut self, offset: u32, payload: &[u8]) -> Result<u32> {
        let written = self.file.write_at(offset, payload)?;
        if written == 0 {
            return Ok(0);
        }
        let added = self.received.insert(offset..offset + written as u32);
        self.rate.record(added as usize);
        Ok(added)
    }

    pub fn is_complete(&self) -> bool {
        self.received.covers(0..self.size)
    }

    /// Bytes of the entry received so far
    pub fn written(&self) -> u64 {
        self.received.covered()
    }

    pub fn fraction(&self) -> f64 {
        fraction(self.written(), u64::from(self.size))
    }

    /// First missing range, at most `max_bytes` long
    pub fn next_request(&self, max_bytes: u32) -> Option<Range<u32>> {
        self.received
            .first_gap(0..self.size)
            .map(|gap| gap.start..gap.end.min(gap.start.saturating_add(max_bytes)))
    }

    /// Whether the request in flight is answered
    ///
    /// It is once its bytes are all here, or once a packet from inside it
    /// reached its end (the vehicle finished streaming it; holes are new gaps).
    pub fn outstanding_resolved(&self, offset: u32, packet_end: u64) -> bool {
        match &self.outstanding {
            Some(range) => {
                self.received.covers(range.clone())
                    || (range.contains(&offset) && packet_end >= u64::from(range.end))
            }
            None => true,
        }
    }

    /// The request to re-issue after a timeout
    ///
    /// Same end as the outstanding request; the start skips whatever prefix
    /// did arrive, so without progress the request is identical.
    pub fn retry_request(&self, max_bytes: u32) -> Option<Range<u32>> {
        match &self.outstanding {
            Some(range) => match self.received.first_gap(range.clone()) {
                Some(gap) => Some(gap.start..range.end),
                None => self.next_request(max_bytes),
            },
            None => self.next_request(max_bytes),
        }
    }
}
