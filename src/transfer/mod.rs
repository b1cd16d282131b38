//! # Transfer Module
//!
//! Listing and chunked download of vehicle logs.
//!
//! This module handles:
//! - The listing/download state machine ([`LogDownloader`])
//! - Tracking which byte ranges of a log have arrived
//! - The single request timeout and its retry budget
//! - Transfer rate sampling for progress reporting
//! - Naming and writing the output files

pub mod engine;
pub mod output;
pub mod ranges;
pub mod rate;
pub mod session;
pub mod timeout;

pub use engine::{DownloadEvent, EngineState, ListingOutcome, LogDownloader, Phase};
pub use ranges::RangeSet;
pub use timeout::TimerGeneration;
