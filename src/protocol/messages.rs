//! # Log Protocol Messages
//!
//! Decoded fields of the vehicle's log service messages. Wire encoding is the
//! telemetry channel's job; the engine only sees these structs.

use bytes::Bytes;

/// Maximum payload carried by one log-data packet
pub const LOG_DATA_MAX_LEN: usize = 90;

/// Upper id bound used to ask the vehicle for every log it has
pub const LIST_ALL_END: u16 = 0xFFFF;

/// One log-entry response fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntryMsg {
    /// Creation time, seconds since the Unix epoch (0 when unknown)
    pub time_utc: u32,

    /// Declared size of the log in bytes
    pub size: u32,

    /// Log id as numbered by the vehicle
    pub id: u16,

    /// Total number of logs on the vehicle
    pub num_logs: u16,

    /// Highest log id on the vehicle
    pub last_log_num: u16,
}

/// One log-data response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDataMsg {
    /// Byte offset of this payload within the log
    pub offset: u32,

    /// Log id as numbered by the vehicle
    pub id: u16,

    /// Number of valid bytes in `data`
    pub count: u8,

    pub data: Bytes,
}

impl LogDataMsg {
    /// Build a packet whose count matches the payload length
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use log_downloader::protocol::LogDataMsg;
    ///
    /// let msg = LogDataMsg::new(0, 90, Bytes::from_static(b"abc"));
    /// assert_eq!(msg.payload(), b"abc");
    /// ```
    pub fn new(id: u16, offset: u32, data: Bytes) -> Self {
        let count = data.len().min(u8::MAX as usize) as u8;
        Self {
            offset,
            id,
            count,
            data,
        }
    }

    /// Valid bytes of the packet; a count larger than the buffer is clamped
    pub fn payload(&self) -> &[u8] {
        let len = (self.count as usize).min(self.data.len());
        &self.data[..len]
    }
}

/// Requests the engine asks the telemetry channel to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRequest {
    /// List logs with ids in `[start, end]`
    List { start: u16, end: u16 },
    /// Stream `count` bytes of log `id` starting at `offset`
    Data { id: u16, offset: u32, count: u32 },
    /// Erase every log on the vehicle
    EraseAll,
    /// Stop any listing or data streaming in progress
    EndSession,
}

/// Inbound events delivered to the engine by the telemetry channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Entry(LogEntryMsg),
    Data(LogDataMsg),
    /// The transport failed to send or receive
    TransportError(String),
}
