//! # Transfer State Machine
//!
//! Drives the listing and download phases against a [`VehicleLink`].
//!
//! ## Phases
//!
//! ```text
//! Idle ──refresh──▶ Listing ──▶ ListingComplete ──download──▶ Downloading ──▶ DownloadComplete
//!   ▲                  │               │                          │                 │
//!   └──────────────────┴─── cancel ────┴──────────────────────────┴─────────────────┘
//! ```
//!
//! ## Discipline
//!
//! - Exactly one request is in flight at a time, guarded by one timeout.
//! - Selected entries download strictly one after another, lowest id first.
//! - Every failure (timeouts, bad fragments, file errors, link errors) is
//!   logged and turned into a partial result; the engine always ends up in
//!   `Idle`, `ListingComplete` or `DownloadComplete`.
//!
//! The engine is synchronous. [`crate::driver`] feeds it link events, caller
//! commands, timer firings and rate ticks from a single task.

use std::path::PathBuf;
use tokio::sync::{broadcast, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::output::{log_file_name, LogFile};
use super::rate::progress_text;
use super::session::{DownloadSession, ListingSession};
use super::timeout::{TimeoutSupervisor, TimerGeneration};
use crate::catalog::{EntryCatalog, EntryStatus};
use crate::config::{Config, DownloadConfig, Firmware, PartialListingPolicy};
use crate::error::{LogDownloadError, Result};
use crate::protocol::messages::{LogDataMsg, LogEntryMsg, LIST_ALL_END};
use crate::protocol::VehicleLink;
use crate::report::{Manifest, ManifestRecord};

/// Capacity of the event broadcast; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 256;

/// Engine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listing,
    ListingComplete,
    Downloading,
    DownloadComplete,
}

impl Phase {
    /// Whether a listing or download is in flight
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Listing | Phase::Downloading)
    }
}

/// Snapshot published on every phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub phase: Phase,
    pub requesting_list: bool,
    pub downloading_logs: bool,
}

impl From<Phase> for EngineState {
    fn from(phase: Phase) -> Self {
        Self {
            phase,
            requesting_list: phase == Phase::Listing,
            downloading_logs: phase == Phase::Downloading,
        }
    }
}

/// How a listing ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome {
    /// Every announced entry was listed
    Complete { count: u16 },
    /// The vehicle has no logs
    Empty,
    /// Gave up with these catalog ids never listed
    Partial { missing: Vec<u16> },
    /// The vehicle never answered
    NoResponse,
}

/// Events published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    PhaseChanged(Phase),
    EntryListed { id: u16, size_bytes: u32 },
    ListingFinished(ListingOutcome),
    EntryStarted { id: u16, path: PathBuf },
    Progress { id: u16, fraction: f64, rate: f64, avg_rate: f64 },
    EntryFinished { id: u16, status: EntryStatus, path: Option<PathBuf> },
    DownloadFinished { downloaded: usize, failed: usize },
    Erased,
}

/// Log download engine
pub struct LogDownloader<L: VehicleLink> {
    config: DownloadConfig,
    firmware: Firmware,
    link: Option<L>,
    catalog: EntryCatalog,
    phase: Phase,
    listing: Option<ListingSession>,
    download: Option<DownloadSession>,
    download_dir: PathBuf,
    timer: TimeoutSupervisor,
    downloaded: usize,
    failed: usize,
    /// A listing was cut short or the vehicle's logs were erased since the
    /// last refresh
    interrupted: bool,
    state_tx: watch::Sender<EngineState>,
    events: broadcast::Sender<DownloadEvent>,
}

impl<L: VehicleLink> LogDownloader<L> {
    pub fn new(config: &Config) -> Self {
        let (state_tx, _) = watch::channel(EngineState::from(Phase::Idle));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            download_dir: config.download.output_path(),
            config: config.download.clone(),
            firmware: config.vehicle.firmware,
            link: None,
            catalog: EntryCatalog::new(),
            phase: Phase::Idle,
            listing: None,
            download: None,
            timer: TimeoutSupervisor::new(),
            downloaded: 0,
            failed: 0,
            interrupted: false,
            state_tx,
            events,
        }
    }

    /// Engine with `link` already attached
    pub fn with_link(config: &Config, link: L) -> Self {
        let mut engine = Self::new(config);
        engine.link = Some(link);
        engine
    }

    // ---- observation -------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True strictly between `refresh()` and the end of the listing
    pub fn requesting_list(&self) -> bool {
        self.phase == Phase::Listing
    }

    /// True strictly between `download()` and the end of the last entry
    pub fn downloading_logs(&self) -> bool {
        self.phase == Phase::Downloading
    }

    pub fn catalog(&self) -> &EntryCatalog {
        &self.catalog
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    /// Deadline of the request in flight, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Generation tag of the armed deadline, if any
    pub fn armed_timeout(&self) -> Option<TimerGeneration> {
        self.timer.armed_generation()
    }

    pub fn link(&self) -> Option<&L> {
        self.link.as_ref()
    }

    /// Interval between progress samples
    pub fn rate_tick(&self) -> Duration {
        self.config.rate_tick()
    }

    // ---- selection ---------------------------------------------------

    /// Select or deselect a listed entry; refused while downloading
    pub fn select(&mut self, id: u16, selected: bool) -> bool {
        if self.phase == Phase::Downloading {
            warn!("Selection change ignored while downloading");
            return false;
        }
        self.catalog.set_selected(id, selected)
    }

    pub fn select_all(&mut self) -> usize {
        if self.phase == Phase::Downloading {
            warn!("Selection change ignored while downloading");
            return 0;
        }
        self.catalog.select_all()
    }

    // ---- caller operations ------------------------------------------

    /// Enumerate the vehicle's logs
    ///
    /// Clears the catalog and asks for every entry. Ignored while a listing
    /// or download is running, or without a link.
    pub fn refresh(&mut self) {
        if let Err(e) = self.check_ready(&[
            Phase::Idle,
            Phase::ListingComplete,
            Phase::DownloadComplete,
        ]) {
            warn!("Refresh ignored: {}", e);
            return;
        }

        info!("Requesting log list");
        self.catalog.clear();
        self.listing = Some(ListingSession::new(std::mem::take(&mut self.interrupted)));
        self.set_phase(Phase::Listing);

        // Wire ids, sent as-is: "everything"
        self.send_list(0, LIST_ALL_END);
        self.timer.arm(self.config.list_timeout());
    }

    /// Download the selected entries into `dir` (or the configured directory)
    ///
    /// Requires a finished listing and a non-empty selection.
    pub fn download(&mut self, dir: Option<PathBuf>) {
        if let Err(e) = self.check_ready(&[Phase::ListingComplete, Phase::DownloadComplete]) {
            warn!("Download ignored: {}", e);
            return;
        }

        let queued: Vec<u16> = self.catalog.selected().map(|e| e.id).collect();
        if queued.is_empty() {
            warn!("Download ignored: no logs selected");
            return;
        }

        self.download_dir = dir.unwrap_or_else(|| self.config.output_path());
        info!(
            "Downloading {} log(s) to {}",
            queued.len(),
            self.download_dir.display()
        );

        for id in queued {
            if let Some(entry) = self.catalog.get_mut(id) {
                entry.set_status(EntryStatus::Waiting);
            }
        }

        self.downloaded = 0;
        self.failed = 0;
        self.set_phase(Phase::Downloading);
        self.start_next_entry();
    }

    /// Erase every log on the vehicle and forget the catalog
    pub fn erase_all(&mut self) {
        if let Err(e) = self.check_ready(&[
            Phase::Idle,
            Phase::ListingComplete,
            Phase::DownloadComplete,
        ]) {
            warn!("Erase refused: {}", e);
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        info!("Erasing all logs on vehicle");
        if let Err(e) = link.send_erase_request() {
            warn!("Failed to send erase request: {}", e);
        }

        self.catalog.clear();
        self.interrupted = true;
        self.set_phase(Phase::Idle);
        self.emit(DownloadEvent::Erased);

        if self.config.refresh_after_erase {
            self.refresh();
        }
    }

    /// Abort whatever is in flight and return to `Idle`
    ///
    /// Asks the vehicle to stop streaming, deletes the partial file and
    /// marks the in-flight and still-queued entries canceled. Responses that
    /// arrive afterwards find no session and are dropped; listing fragments
    /// that reach the next listing with an outdated log count are discarded
    /// there.
    pub fn cancel(&mut self) {
        if self.phase == Phase::Idle {
            debug!("Cancel ignored: idle");
            return;
        }

        if self.phase.is_busy() {
            if let Some(link) = self.link.as_mut() {
                if let Err(e) = link.send_end_session_request() {
                    warn!("Failed to send end-session request: {}", e);
                }
            }
        }

        info!("Canceling {:?}", self.phase);
        self.abort();
    }

    /// Attach a new link or detach the current one
    ///
    /// Anything in flight belongs to the old vehicle: it is aborted without
    /// talking to the old link, and the catalog is dropped.
    pub fn set_link(&mut self, link: Option<L>) {
        if self.phase.is_busy() {
            warn!("Vehicle link changed during {:?}, aborting", self.phase);
        }
        if self.phase != Phase::Idle {
            self.abort();
        }
        self.catalog.clear();
        self.link = link;
        info!(
            "Vehicle link {}",
            if self.link.is_some() { "attached" } else { "detached" }
        );
    }

    // ---- inbound events ---------------------------------------------

    /// A log-entry response arrived
    pub fn on_entry(&mut self, msg: LogEntryMsg) {
        if self.phase != Phase::Listing {
            debug!(id = msg.id, "Log entry ignored outside listing");
            return;
        }
        self.reconcile_log_count(msg.num_logs);

        if msg.num_logs == 0 {
            match self.catalog.announce(0, msg.last_log_num) {
                Ok(()) => {
                    info!("Vehicle reports no logs");
                    self.finish_listing();
                }
                Err(e) => warn!("Ignoring log entry: {}", e),
            }
            return;
        }

        let offset = self.firmware.id_offset();
        let known_count = self.catalog.num_logs();
        let accepted = if self.firmware == Firmware::ArduPilot && msg.size == 0 {
            // ArduPilot opens with a bogus entry whose only content is the count
            self.catalog
                .announce(msg.num_logs, msg.last_log_num)
                .map(|()| known_count.is_none())
        } else {
            match msg.id.checked_sub(offset) {
                Some(id) => {
                    let fresh = !self.catalog.get(id).is_some_and(|e| e.received);
                    self.catalog
                        .add_or_update(id, msg.time_utc, msg.size, msg.num_logs, msg.last_log_num)
                        .map(|()| {
                            self.emit(DownloadEvent::EntryListed {
                                id,
                                size_bytes: msg.size,
                            });
                            fresh
                        })
                }
                None => Err(LogDownloadError::Protocol(format!(
                    "log id {} below firmware base {}",
                    msg.id, offset
                ))),
            }
        };

        // Only new information refills the retry budget or moves the deadline
        match accepted {
            Ok(true) => {
                if let Some(listing) = self.listing.as_mut() {
                    listing.retries = 0;
                }
            }
            Ok(false) => {
                debug!(id = msg.id, "Duplicate log entry");
                return;
            }
            Err(e) => {
                warn!("Ignoring log entry: {}", e);
                return;
            }
        }

        if self.catalog.is_complete() {
            self.finish_listing();
        } else {
            self.timer.arm(self.config.timeout());
        }
    }

    /// A log-data packet arrived
    pub fn on_data(&mut self, msg: LogDataMsg) {
        if self.phase != Phase::Downloading {
            debug!(id = msg.id, offset = msg.offset, "Log data ignored outside download");
            return;
        }
        let Some(session) = self.download.as_mut() else {
            return;
        };

        let id = msg.id.checked_sub(self.firmware.id_offset());
        if id != Some(session.id) {
            warn!(
                "Received log data for id {} while downloading {}",
                msg.id, session.id
            );
            return;
        }

        let payload = msg.payload();
        if msg.offset >= session.size && !payload.is_empty() {
            warn!(
                "Received log offset {} beyond size {} for log {}",
                msg.offset, session.size, session.id
            );
        }

        let added = match session.record(msg.offset, payload) {
            Ok(added) => added,
            Err(e) => {
                error!("Error while writing log file chunk: {}", e);
                self.finish_entry(EntryStatus::Failed);
                self.start_next_entry();
                return;
            }
        };
        if added == 0 {
            // Duplicate or out of range: neither progress nor an answer
            debug!(id = session.id, offset = msg.offset, "No new log data in packet");
            return;
        }
        session.retries = 0;

        if session.is_complete() {
            self.finish_entry(EntryStatus::Downloaded);
            self.start_next_entry();
            return;
        }

        let packet_end = u64::from(msg.offset) + payload.len() as u64;
        if session.outstanding_resolved(msg.offset, packet_end) {
            self.request_next_range();
        } else {
            self.timer.arm(self.config.timeout());
        }
    }

    /// The transport reported a failure; treated like a timeout
    pub fn on_transport_error(&mut self, reason: &str) {
        warn!("Transport error: {}", reason);
        if self.phase.is_busy() {
            self.timer.disarm();
            self.handle_timeout();
        }
    }

    /// A timer armed with `generation` fired
    pub fn on_timeout(&mut self, generation: TimerGeneration) {
        if self.timer.fire(generation) {
            self.handle_timeout();
        }
    }

    /// Fire the armed timeout if its deadline is at or before `now`
    pub fn poll_timeout(&mut self, now: Instant) {
        if self.timer.is_expired(now) {
            if let Some(generation) = self.timer.armed_generation() {
                self.on_timeout(generation);
            }
        }
    }

    /// Rate tick: publish progress of the entry in flight
    pub fn on_rate_tick(&mut self, now: Instant) {
        let Some(session) = self.download.as_mut() else {
            return;
        };

        let sample = session.rate.tick(now);
        let written = session.written();
        let fraction = session.fraction();
        let id = session.id;

        if let Some(entry) = self.catalog.get_mut(id) {
            entry.status_text = progress_text(written, sample.avg_rate);
        }

        self.emit(DownloadEvent::Progress {
            id,
            fraction,
            rate: sample.rate,
            avg_rate: sample.avg_rate,
        });
    }

    // ---- internals --------------------------------------------------

    /// Ok if a link is attached and the engine is in one of `allowed`
    fn check_ready(&self, allowed: &[Phase]) -> Result<()> {
        if self.link.is_none() {
            return Err(LogDownloadError::InvalidState("no vehicle link".to_string()));
        }
        if !allowed.contains(&self.phase) {
            return Err(LogDownloadError::InvalidState(match self.phase {
                Phase::Idle => "no completed log listing".to_string(),
                busy => format!("{:?} in progress", busy),
            }));
        }
        Ok(())
    }

    fn handle_timeout(&mut self) {
        match self.phase {
            Phase::Listing => self.listing_timeout(),
            Phase::Downloading => self.data_timeout(),
            _ => {}
        }
    }

    fn listing_timeout(&mut self) {
        let Some(listing) = self.listing.as_mut() else {
            return;
        };

        listing.retries += 1;
        if listing.retries >= self.config.max_retries {
            warn!(
                "Too many errors retrieving log list, giving up after {} attempts",
                listing.retries
            );
            self.finish_listing();
            return;
        }

        let offset = self.firmware.id_offset();
        let Some(n) = self.catalog.num_logs() else {
            debug!(retry = listing.retries, "Re-requesting full log list");
            listing.outstanding = None;
            self.send_list(0, LIST_ALL_END);
            self.timer.arm(self.config.list_timeout());
            return;
        };

        // Repeat the request in flight while any of its ids is still missing
        let pending = listing.outstanding.filter(|&(start, end)| {
            self.catalog
                .entries_missing(n)
                .any(|id| (start..=end).contains(&id))
        });
        let next = pending.or_else(|| {
            self.catalog
                .missing_ranges(n)
                .first()
                .map(|run| (*run.start(), *run.end()))
        });

        match next {
            Some((start, end)) => {
                debug!(retry = listing.retries, start, end, "Re-requesting missing log entries");
                listing.outstanding = Some((start, end));
                self.send_list(start + offset, end + offset);
                self.timer.arm(self.config.timeout());
            }
            None => self.finish_listing(),
        }
    }

    /// Drop fragments left over from an interrupted listing
    ///
    /// After a cancel or an erase, fragments of the earlier listing can still
    /// arrive and fix an outdated log count. The first fragment that
    /// disagrees with that count restarts the catalog from its own count,
    /// once per listing.
    fn reconcile_log_count(&mut self, num_logs: u16) {
        let Some(listing) = self.listing.as_mut() else {
            return;
        };
        let Some(known) = self.catalog.num_logs() else {
            return;
        };
        if !listing.after_interruption || known == num_logs {
            return;
        }

        info!(
            "Discarding {} stale log entries (log count {} replaced by {})",
            self.catalog.len(),
            known,
            num_logs
        );
        listing.after_interruption = false;
        listing.outstanding = None;
        self.catalog.clear();
    }

    fn finish_listing(&mut self) {
        self.timer.disarm();
        self.listing = None;

        let outcome = match self.catalog.num_logs() {
            None => ListingOutcome::NoResponse,
            Some(0) => ListingOutcome::Empty,
            Some(n) => {
                let missing = self.catalog.mark_missing_failed(n);
                if missing.is_empty() {
                    ListingOutcome::Complete { count: n }
                } else {
                    ListingOutcome::Partial { missing }
                }
            }
        };

        let accepted = match (&outcome, self.config.partial_listing) {
            (ListingOutcome::Complete { .. } | ListingOutcome::Empty, _) => true,
            (_, PartialListingPolicy::Accept) => true,
            (_, PartialListingPolicy::Reject) => false,
        };

        info!("Log listing finished: {:?}", outcome);
        self.set_phase(if accepted {
            Phase::ListingComplete
        } else {
            Phase::Idle
        });
        self.emit(DownloadEvent::ListingFinished(outcome));
    }

    /// Open the next selected entry and ask for its first range
    fn start_next_entry(&mut self) {
        while let Some(id) = self.catalog.next_selected() {
            self.catalog.set_selected(id, false);
            let Some(entry) = self.catalog.get(id).cloned() else {
                continue;
            };

            let name = log_file_name(&entry, self.firmware);
            let file = match LogFile::create(&self.download_dir, &name, entry.size_bytes) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Failed to create log file for log {}: {}", id, e);
                    self.record_finished(id, EntryStatus::Failed, None);
                    continue;
                }
            };

            info!(
                "Downloading log {} ({} bytes) to {}",
                id,
                entry.size_bytes,
                file.path().display()
            );
            let path = file.path().to_path_buf();
            self.download = Some(DownloadSession::new(id, file, Instant::now()));
            if let Some(entry) = self.catalog.get_mut(id) {
                entry.set_status(EntryStatus::Downloading);
            }
            self.emit(DownloadEvent::EntryStarted { id, path });

            if self.download.as_ref().is_some_and(|s| s.is_complete()) {
                // Empty log: nothing to ask for
                self.finish_entry(EntryStatus::Downloaded);
                continue;
            }

            self.request_next_range();
            return;
        }

        self.finish_download();
    }

    fn request_next_range(&mut self) {
        let Some(session) = self.download.as_mut() else {
            return;
        };
        let Some(range) = session.next_request(self.config.max_request_bytes) else {
            return;
        };

        session.outstanding = Some(range.clone());
        let wire_id = session.id + self.firmware.id_offset();
        let count = range.end - range.start;
        Self::send_data(&mut self.link, wire_id, range.start, count, session.retries);
        self.timer.arm(self.config.timeout());
    }

    fn data_timeout(&mut self) {
        let Some(session) = self.download.as_mut() else {
            return;
        };

        session.retries += 1;
        if session.retries >= self.config.max_retries {
            warn!(
                "Log {} timed out after {} attempts, skipping",
                session.id, session.retries
            );
            self.finish_entry(EntryStatus::TimedOut);
            self.start_next_entry();
            return;
        }

        match session.retry_request(self.config.max_request_bytes) {
            Some(range) => {
                session.outstanding = Some(range.clone());
                let wire_id = session.id + self.firmware.id_offset();
                let count = range.end - range.start;
                Self::send_data(&mut self.link, wire_id, range.start, count, session.retries);
                self.timer.arm(self.config.timeout());
            }
            None => {
                self.finish_entry(EntryStatus::Downloaded);
                self.start_next_entry();
            }
        }
    }

    /// Close out the entry in flight with `status`
    fn finish_entry(&mut self, status: EntryStatus) {
        self.timer.disarm();
        let Some(session) = self.download.take() else {
            return;
        };
        let id = session.id;

        let keep = status == EntryStatus::Downloaded
            || (self.config.keep_partial && status == EntryStatus::TimedOut);

        let (status, path) = if keep {
            if status != EntryStatus::Downloaded {
                let holes = session.received.gaps(session.size);
                warn!("Keeping partial log {} with {} missing range(s)", id, holes.len());
            }
            match session.file.finish() {
                Ok(path) => (status, Some(path)),
                Err(e) => {
                    error!("Failed to finalize log {}: {}", id, e);
                    (EntryStatus::Failed, None)
                }
            }
        } else {
            session.file.discard();
            (status, None)
        };

        match status {
            EntryStatus::Downloaded => info!("Log {} downloaded", id),
            other => warn!("Log {} finished with status {}", id, other),
        }
        self.record_finished(id, status, path);
    }

    fn record_finished(&mut self, id: u16, status: EntryStatus, path: Option<PathBuf>) {
        match status {
            EntryStatus::Downloaded => self.downloaded += 1,
            EntryStatus::Canceled => {}
            _ => self.failed += 1,
        }

        if let Some(entry) = self.catalog.get_mut(id) {
            entry.set_status(status);
            if self.config.write_manifest {
                let record = ManifestRecord::new(entry, status, path.clone());
                if let Err(e) = Manifest::new(&self.download_dir).append(&record) {
                    warn!("Failed to update download manifest: {}", e);
                }
            }
        }

        self.emit(DownloadEvent::EntryFinished { id, status, path });
    }

    fn finish_download(&mut self) {
        self.timer.disarm();
        info!(
            "Log download finished: {} downloaded, {} failed",
            self.downloaded, self.failed
        );
        self.set_phase(Phase::DownloadComplete);
        self.emit(DownloadEvent::DownloadFinished {
            downloaded: self.downloaded,
            failed: self.failed,
        });
    }

    /// Drop all session state and go `Idle`, discarding partial output
    fn abort(&mut self) {
        self.timer.disarm();
        if self.listing.take().is_some() {
            self.interrupted = true;
        }

        if let Some(session) = self.download.take() {
            let id = session.id;
            session.file.discard();
            self.record_finished(id, EntryStatus::Canceled, None);
        }

        for id in self.catalog.clear_selection() {
            if let Some(entry) = self.catalog.get_mut(id) {
                entry.set_status(EntryStatus::Canceled);
            }
        }

        self.set_phase(Phase::Idle);
    }

    fn send_list(&mut self, start: u16, end: u16) {
        debug!(start, end, "Request log list");
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.send_list_request(start, end) {
                // The armed timeout retries it
                warn!("Failed to send log list request: {}", e);
            }
        }
    }

    fn send_data(link: &mut Option<L>, id: u16, offset: u32, count: u32, retry: u32) {
        debug!(id, offset, count, retry, "Request log data");
        if let Some(link) = link.as_mut() {
            if let Err(e) = link.send_data_request(id, offset, count) {
                warn!("Failed to send log data request: {}", e);
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        debug!("Phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.state_tx.send_replace(EngineState::from(phase));
        self.emit(DownloadEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
