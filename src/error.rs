//! # Error Types
//!
//! Custom error types for the log downloader using `thiserror`.

use thiserror::Error;

/// Main error type for the log downloader
#[derive(Debug, Error)]
pub enum LogDownloadError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors (output files, manifest)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vehicle link failed to accept an outgoing request
    #[error("Link error: {0}")]
    Link(String),

    /// Vehicle sent something inconsistent with the current listing/download
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation not permitted in the current engine phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Manifest serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the log downloader
pub type Result<T> = std::result::Result<T, LogDownloadError>;
