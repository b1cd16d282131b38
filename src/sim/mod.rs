//! # Simulated Vehicle
//!
//! A stand-in for the vehicle's log service, used by the command line tool
//! and the end-to-end tests.
//!
//! This module handles:
//! - Generating reproducible log contents from a seed
//! - Answering list, data, erase and end-session requests
//! - Splitting data replies into 90-byte packets
//! - Dropping every n-th reply to imitate a lossy radio link

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::{Firmware, SimulatorConfig};
use crate::protocol::messages::{LOG_DATA_MAX_LEN, LIST_ALL_END};
use crate::protocol::{LinkEvent, LinkRequest, LogDataMsg, LogEntryMsg};

/// Creation time of the first simulated log (2023-11-14 22:13:20 UTC)
const BASE_TIME_UTC: u32 = 1_700_000_000;

/// One log stored on the simulated vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedLog {
    pub time_utc: u32,
    pub data: Bytes,
}

/// Vehicle log service answering [`LinkRequest`]s
#[derive(Debug)]
pub struct SimulatedVehicle {
    firmware: Firmware,
    logs: Vec<SimulatedLog>,
    drop_every: u32,
    replies: u64,
    dropped: u64,
}

impl SimulatedVehicle {
    /// Vehicle storing `logs`, numbered from the firmware's base id
    pub fn new(firmware: Firmware, logs: Vec<SimulatedLog>) -> Self {
        Self {
            firmware,
            logs,
            drop_every: 0,
            replies: 0,
            dropped: 0,
        }
    }

    /// Vehicle with generated logs as described by `config`
    ///
    /// Log `i` is `log_size + 37 * i` bytes long, so trailing packets are
    /// rarely full.
    pub fn from_config(config: &SimulatorConfig, firmware: Firmware) -> Self {
        let logs = (0..config.num_logs)
            .map(|i| SimulatedLog {
                time_utc: BASE_TIME_UTC + u32::from(i) * 3600,
                data: generate_contents(
                    config.seed.wrapping_add(u64::from(i)),
                    config.log_size as usize + 37 * i as usize,
                ),
            })
            .collect();

        Self::new(firmware, logs).with_drop_every(config.drop_every)
    }

    /// Drop every `n`-th reply (0 disables loss)
    pub fn with_drop_every(mut self, n: u32) -> Self {
        self.drop_every = n;
        self
    }

    pub fn logs(&self) -> &[SimulatedLog] {
        &self.logs
    }

    /// Replies swallowed by the simulated loss so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Answer one request
    pub fn handle(&mut self, request: LinkRequest) -> Vec<LinkEvent> {
        let mut out = Vec::new();

        match request {
            LinkRequest::List { start, end } => self.list(start, end, &mut out),
            LinkRequest::Data { id, offset, count } => self.data(id, offset, count, &mut out),
            LinkRequest::EraseAll => {
                info!("Simulator erasing {} log(s)", self.logs.len());
                self.logs.clear();
            }
            LinkRequest::EndSession => debug!("Simulator session ended"),
        }

        out
    }

    /// Serve requests until either channel closes, then hand the vehicle back
    pub async fn serve(
        mut self,
        mut requests: mpsc::UnboundedReceiver<LinkRequest>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        while let Some(request) = requests.recv().await {
            for event in self.handle(request) {
                if events.send(event).is_err() {
                    debug!("Simulator event channel closed");
                    return self;
                }
            }
            // Let the engine run between bursts
            tokio::task::yield_now().await;
        }

        debug!("Simulator request channel closed");
        self
    }

    fn list(&mut self, start: u16, end: u16, out: &mut Vec<LinkEvent>) {
        let num_logs = self.logs.len() as u16;
        let base = self.firmware.id_offset();
        let last_log_num = if num_logs == 0 { 0 } else { num_logs - 1 + base };

        if num_logs == 0 {
            self.emit(
                LinkEvent::Entry(LogEntryMsg {
                    time_utc: 0,
                    size: 0,
                    id: 0,
                    num_logs: 0,
                    last_log_num: 0,
                }),
                out,
            );
            return;
        }

        if self.firmware == Firmware::ArduPilot && start == 0 && end == LIST_ALL_END {
            // Count-only opener
            self.emit(
                LinkEvent::Entry(LogEntryMsg {
                    time_utc: 0,
                    size: 0,
                    id: 0,
                    num_logs,
                    last_log_num,
                }),
                out,
            );
        }

        let first = start.max(base);
        let last = end.min(last_log_num);
        for wire_id in first..=last {
            let Some(log) = self.logs.get(usize::from(wire_id - base)) else {
                continue;
            };
            let entry = LogEntryMsg {
                time_utc: log.time_utc,
                size: log.data.len() as u32,
                id: wire_id,
                num_logs,
                last_log_num,
            };
            self.emit(LinkEvent::Entry(entry), out);
        }
    }

    fn data(&mut self, wire_id: u16, offset: u32, count: u32, out: &mut Vec<LinkEvent>) {
        let Some(index) = wire_id.checked_sub(self.firmware.id_offset()) else {
            return;
        };
        let Some(log) = self.logs.get(usize::from(index)) else {
            debug!(wire_id, "Simulator has no such log");
            return;
        };
        let data = log.data.clone();

        let size = data.len();
        let start = (offset as usize).min(size);
        let end = start.saturating_add(count as usize).min(size);

        if start == end {
            // Past the end: one empty packet
            self.emit(LinkEvent::Data(LogDataMsg::new(wire_id, offset, Bytes::new())), out);
            return;
        }

        let mut pos = start;
        while pos < end {
            let chunk_end = (pos + LOG_DATA_MAX_LEN).min(end);
            let packet = LogDataMsg::new(wire_id, pos as u32, data.slice(pos..chunk_end));
            self.emit(LinkEvent::Data(packet), out);
            pos = chunk_end;
        }
    }

    fn emit(&mut self, event: LinkEvent, out: &mut Vec<LinkEvent>) {
        self.replies += 1;
        if self.drop_every > 0 && self.replies % u64::from(self.drop_every) == 0 {
            self.dropped += 1;
            trace!(reply = self.replies, "Simulator dropped reply");
            return;
        }
        out.push(event);
    }
}

/// Reproducible pseudo-random bytes (xorshift64*)
fn generate_contents(seed: u64, len: usize) -> Bytes {
    let mut state = seed | 1;
    let mut buf = Vec::with_capacity(len);
    while buf.len() < len {
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let word = state.wrapping_mul(0x2545_F491_4F6C_DD1D).to_le_bytes();
        let take = (len - buf.len()).min(word.len());
        buf.extend_from_slice(&word[..take]);
    }
    Bytes::from(buf)
}
