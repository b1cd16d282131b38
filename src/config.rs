//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LogDownloadError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Transfer timing, retry and output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    /// Deadline for a data request (and for listing re-requests)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Deadline for the initial "list everything" request
    #[serde(default = "default_list_timeout_ms")]
    pub list_timeout_ms: u64,

    /// Consecutive timeouts tolerated before an entry or listing gives up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Progress/rate publication period
    #[serde(default = "default_rate_tick_ms")]
    pub rate_tick_ms: u64,

    /// Largest byte range asked for in a single data request
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: u32,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Keep the partial file of an entry that timed out
    #[serde(default)]
    pub keep_partial: bool,

    #[serde(default)]
    pub partial_listing: PartialListingPolicy,

    #[serde(default)]
    pub refresh_after_erase: bool,

    #[serde(default = "default_write_manifest")]
    pub write_manifest: bool,
}

/// What a listing that gave up with ids still missing turns into
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PartialListingPolicy {
    /// Keep what was listed and allow downloads from it
    #[default]
    Accept,
    /// Keep the catalog for display but refuse downloads until a clean refresh
    Reject,
}

/// Autopilot flavor, which changes log numbering and file extension
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Firmware {
    #[default]
    Px4,
    ArduPilot,
}

impl Firmware {
    /// Offset between wire log ids and catalog ids (ArduPilot numbers logs from 1)
    pub fn id_offset(self) -> u16 {
        match self {
            Firmware::Px4 => 0,
            Firmware::ArduPilot => 1,
        }
    }

    /// File extension of downloaded logs
    pub fn log_extension(self) -> &'static str {
        match self {
            Firmware::Px4 => "ulg",
            Firmware::ArduPilot => "bin",
        }
    }
}

/// Vehicle configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct VehicleConfig {
    #[serde(default)]
    pub firmware: Firmware,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty logs to stdout only
    #[serde(default)]
    pub log_dir: String,
}

/// Simulated vehicle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_sim_num_logs")]
    pub num_logs: u16,

    #[serde(default = "default_sim_log_size")]
    pub log_size: u32,

    /// Drop every Nth outgoing packet (0 disables loss)
    #[serde(default)]
    pub drop_every: u32,

    #[serde(default = "default_sim_seed")]
    pub seed: u64,
}

// Default value functions
fn default_timeout_ms() -> u64 { 500 }
fn default_list_timeout_ms() -> u64 { 5000 }
fn default_max_retries() -> u32 { 3 }
fn default_rate_tick_ms() -> u64 { 100 }
fn default_max_request_bytes() -> u32 { 46080 }
fn default_output_dir() -> String { "./logs".to_string() }
fn default_write_manifest() -> bool { true }

fn default_log_level() -> String { "info".to_string() }

fn default_sim_num_logs() -> u16 { 3 }
fn default_sim_log_size() -> u32 { 65536 }
fn default_sim_seed() -> u64 { 0x5EED }

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            list_timeout_ms: default_list_timeout_ms(),
            max_retries: default_max_retries(),
            rate_tick_ms: default_rate_tick_ms(),
            max_request_bytes: default_max_request_bytes(),
            output_dir: default_output_dir(),
            keep_partial: false,
            partial_listing: PartialListingPolicy::default(),
            refresh_after_erase: false,
            write_manifest: default_write_manifest(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            num_logs: default_sim_num_logs(),
            log_size: default_sim_log_size(),
            drop_every: 0,
            seed: default_sim_seed(),
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn rate_tick(&self) -> Duration {
        Duration::from_millis(self.rate_tick_ms)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use log_downloader::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let download = &self.download;

        if download.timeout_ms == 0 || download.timeout_ms > 60000 {
            return Err(invalid("timeout_ms must be between 1 and 60000"));
        }

        if download.list_timeout_ms == 0 || download.list_timeout_ms > 60000 {
            return Err(invalid("list_timeout_ms must be between 1 and 60000"));
        }

        if download.max_retries == 0 || download.max_retries > 100 {
            return Err(invalid("max_retries must be between 1 and 100"));
        }

        if download.rate_tick_ms == 0 || download.rate_tick_ms > 10000 {
            return Err(invalid("rate_tick_ms must be between 1 and 10000"));
        }

        if download.max_request_bytes == 0 {
            return Err(invalid("max_request_bytes must be greater than 0"));
        }

        if download.output_dir.is_empty() {
            return Err(invalid("output_dir cannot be empty"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging level must be one of: trace, debug, info, warn, error",
            ));
        }

        if self.simulator.log_size == 0 {
            return Err(invalid("simulator log_size must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> LogDownloadError {
    LogDownloadError::Config(toml::de::Error::custom(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vehicle.firmware, Firmware::Px4);
        assert_eq!(config.download.partial_listing, PartialListingPolicy::Accept);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[download]
timeout_ms = 250
max_retries = 5
partial_listing = "reject"

[vehicle]
firmware = "ardupilot"

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.download.timeout_ms, 250);
        assert_eq!(config.download.max_retries, 5);
        assert_eq!(config.download.partial_listing, PartialListingPolicy::Reject);
        assert_eq!(config.download.list_timeout_ms, 5000);
        assert_eq!(config.vehicle.firmware, Firmware::ArduPilot);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.simulator.num_logs, 3);
    }

    #[test]
    fn test_shipped_default_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.download.max_request_bytes, 46080);
        assert_eq!(config.simulator.seed, default_sim_seed());
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use tempfile::NamedTempFile;

        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.download.timeout_ms, default_timeout_ms());
        assert_eq!(config.download.output_dir, "./logs");
    }

    #[test]
    fn test_unknown_firmware_rejected() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[vehicle]\nfirmware = \"betaflight\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/log-downloader.toml");
        assert!(matches!(result, Err(LogDownloadError::Io(_))));
    }

    #[test]
    fn test_timeout_ms_zero() {
        let mut config = Config::default();
        config.download.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_ms_too_high() {
        let mut config = Config::default();
        config.download.timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_timeout_zero() {
        let mut config = Config::default();
        config.download.list_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_retries_zero() {
        let mut config = Config::default();
        config.download.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_tick_zero() {
        let mut config = Config::default();
        config.download.rate_tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_request_bytes_zero() {
        let mut config = Config::default();
        config.download.max_request_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_output_dir() {
        let mut config = Config::default();
        config.download.output_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulator_log_size_zero() {
        let mut config = Config::default();
        config.simulator.log_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_firmware_id_offset_and_extension() {
        assert_eq!(Firmware::Px4.id_offset(), 0);
        assert_eq!(Firmware::ArduPilot.id_offset(), 1);
        assert_eq!(Firmware::Px4.log_extension(), "ulg");
        assert_eq!(Firmware::ArduPilot.log_extension(), "bin");
    }

    #[test]
    fn test_duration_helpers() {
        let config = DownloadConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.list_timeout(), Duration::from_millis(5000));
        assert_eq!(config.rate_tick(), Duration::from_millis(100));
        assert_eq!(config.output_path(), PathBuf::from("./logs"));
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_timeout_ms(), 500);
        assert_eq!(default_list_timeout_ms(), 5000);
        assert_eq!(default_max_retries(), 3);
        assert_eq!(default_rate_tick_ms(), 100);
        assert_eq!(default_max_request_bytes(), 46080);
        assert_eq!(default_output_dir(), "./logs");
        assert!(default_write_manifest());
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_sim_num_logs(), 3);
        assert_eq!(default_sim_log_size(), 65536);
    }
}
