//! # Log Protocol Module
//!
//! Message types exchanged with the vehicle's log service and the outbound
//! link abstraction the engine talks through.
//!
//! This module handles:
//! - Decoded log-entry and log-data responses
//! - Outbound list/data/erase/end requests
//! - Handing requests to a transport running on another task

pub mod messages;
pub mod link;

pub use link::{ChannelLink, VehicleLink};
pub use messages::{LinkEvent, LinkRequest, LogDataMsg, LogEntryMsg};
