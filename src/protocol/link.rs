//! Trait abstraction for the outbound side of the vehicle link to enable testing

use tokio::sync::mpsc;
use tracing::trace;

use super::messages::LinkRequest;
use crate::error::{LogDownloadError, Result};

/// Outbound log-service requests
///
/// Every call is fire-and-forget: it hands the request to the telemetry
/// channel and returns. Responses arrive later as [`super::LinkEvent`]s.
/// Ids are wire ids (firmware offset already applied).
#[cfg_attr(test, mockall::automock)]
pub trait VehicleLink: Send {
    /// Ask for the log entries with ids in `[start, end]`
    fn send_list_request(&mut self, start: u16, end: u16) -> Result<()>;

    /// Ask for `count` bytes of log `id` starting at `offset`
    fn send_data_request(&mut self, id: u16, offset: u32, count: u32) -> Result<()>;

    /// Ask the vehicle to erase all logs
    fn send_erase_request(&mut self) -> Result<()>;

    /// Ask the vehicle to stop streaming
    fn send_end_session_request(&mut self) -> Result<()>;
}

/// Link that forwards requests over a tokio channel to a transport task
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<LinkRequest>,
}

impl ChannelLink {
    pub fn new(tx: mpsc::UnboundedSender<LinkRequest>) -> Self {
        Self { tx }
    }

    /// Create a link together with the receiving end the transport drains
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<LinkRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn push(&self, request: LinkRequest) -> Result<()> {
        trace!(?request, "queueing link request");
        self.tx
            .send(request)
            .map_err(|_| LogDownloadError::Link("link request channel closed".to_string()))
    }
}

impl VehicleLink for ChannelLink {
    fn send_list_request(&mut self, start: u16, end: u16) -> Result<()> {
        self.push(LinkRequest::List { start, end })
    }

    fn send_data_request(&mut self, id: u16, offset: u32, count: u32) -> Result<()> {
        self.push(LinkRequest::Data { id, offset, count })
    }

    fn send_erase_request(&mut self) -> Result<()> {
        self.push(LinkRequest::EraseAll)
    }

    fn send_end_session_request(&mut self) -> Result<()> {
        self.push(LinkRequest::EndSession)
    }
}
