//! # Log Downloader Library
//!
//! Retrieve onboard flight logs from a vehicle over a lossy telemetry link.
//!
//! This library lists the logs a vehicle stores, downloads the selected ones
//! in chunks with gap tracking and bounded retries, and writes them to disk
//! byte-for-byte. The transport is abstracted behind
//! [`protocol::VehicleLink`] and [`protocol::LinkEvent`].

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod report;
pub mod sim;
pub mod transfer;
