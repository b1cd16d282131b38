//! # Log Output Files
//!
//! Deterministic naming and positional writes for downloaded logs. Contents
//! are opaque: bytes land at their offset and nothing is interpreted.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::catalog::LogEntry;
use crate::config::Firmware;
use crate::error::Result;

/// Placeholder used in file names when the log time is unknown
pub const UNKNOWN_DATE: &str = "UnknownDate";

/// File name for `entry`: `log_<id>_<date>.<ext>`
///
/// # Examples
///
/// ```
/// use log_downloader::catalog::LogEntry;
/// use log_downloader::config::Firmware;
/// use log_downloader::transfer::output::log_file_name;
///
/// let entry = LogEntry::listed(0, 0, 100, 1);
/// assert_eq!(log_file_name(&entry, Firmware::Px4), "log_0_UnknownDate.ulg");
/// ```
pub fn log_file_name(entry: &LogEntry, firmware: Firmware) -> String {
    let date = match entry.valid_time() {
        Some(time) => time.format("%Y-%-m-%-d-%H-%M-%S").to_string(),
        None => UNKNOWN_DATE.to_string(),
    };
    format!("log_{}_{}.{}", entry.id, date, firmware.log_extension())
}

/// `dir/name`, or `dir/<stem>_<n>.<ext>` for the first `n` not taken
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };

    let mut dups: u32 = 0;
    loop {
        dups += 1;
        let numbered = match ext {
            Some(ext) => format!("{}_{}.{}", stem, dups, ext),
            None => format!("{}_{}", stem, dups),
        };
        let candidate = dir.join(numbered);
        if !candidate.exists() {
            return candidate;
        }
    }
}

/// Output file of one log, pre-sized to its declared length
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    file: File,
    size: u32,
}

impl LogFile {
    /// Create `dir/name` (deduplicated) and allocate `size` bytes
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created or sized;
    /// a half-created file is removed first.
    pub fn create(dir: &Path, name: &str, size: u32) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = unique_path(dir, name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        if let Err(e) = file.set_len(u64::from(size)) {
            warn!("Failed to allocate space for log file {}: {}", path.display(), e);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        debug!("Created log file {} ({} bytes)", path.display(), size);
        Ok(Self { path, file, size })
    }

    /// Write `data` at `offset`, dropping anything past the declared size
    ///
    /// Returns the number of bytes written.
    pub fn write_at(&mut self, offset: u32, data: &[u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }

        let room = (self.size - offset) as usize;
        let data = &data[..data.len().min(room)];

        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.write_all(data)?;
        Ok(data.len())
    }

    /// Flush to disk and hand back the final path
    pub fn finish(mut self) -> Result<PathBuf> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(self.path)
    }

    /// Close and delete the file
    pub fn discard(self) {
        let LogFile { path, file, .. } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove partial log {}: {}", path.display(), e);
        } else {
            debug!("Removed partial log {}", path.display());
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_with_time() {
        // 2023-11-14 22:13:20 UTC
        let entry = LogEntry::listed(7, 1_700_000_000, 100, 8);
        assert_eq!(log_file_name(&entry, Firmware::Px4), "log_7_2023-11-14-22-13-20.ulg");
        assert_eq!(
            log_file_name(&entry, Firmware::ArduPilot),
            "log_7_2023-11-14-22-13-20.bin"
        );
    }

    #[test]
    fn test_file_name_unknown_date() {
        let entry = LogEntry::listed(3, 0, 100, 8);
        assert_eq!(log_file_name(&entry, Firmware::ArduPilot), "log_3_UnknownDate.bin");

        // Clock never synced
        let entry = LogEntry::listed(3, 86_400, 100, 8);
        assert_eq!(log_file_name(&entry, Firmware::Px4), "log_3_UnknownDate.ulg");
    }

    #[test]
    fn test_unique_path_appends_counter() {
        let dir = TempDir::new().unwrap();
        let name = "log_0_UnknownDate.ulg";

        assert_eq!(unique_path(dir.path(), name), dir.path().join(name));

        fs::write(dir.path().join(name), b"x").unwrap();
        assert_eq!(
            unique_path(dir.path(), name),
            dir.path().join("log_0_UnknownDate_1.ulg")
        );

        fs::write(dir.path().join("log_0_UnknownDate_1.ulg"), b"x").unwrap();
        assert_eq!(
            unique_path(dir.path(), name),
            dir.path().join("log_0_UnknownDate_2.ulg")
        );
    }

    #[test]
    fn test_create_presizes_file() {
        let dir = TempDir::new().unwrap();
        let file = LogFile::create(dir.path(), "a.ulg", 100).unwrap();
        assert_eq!(fs::metadata(file.path()).unwrap().len(), 100);
    }

    #[test]
    fn test_create_makes_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("vehicle").join("logs");
        let file = LogFile::create(&nested, "a.ulg", 10).unwrap();
        assert!(file.path().starts_with(&nested));
    }

    #[test]
    fn test_out_of_order_writes() {
        let dir = TempDir::new().unwrap();
        let expected: Vec<u8> = (0..100u8).collect();

        let mut file = LogFile::create(dir.path(), "a.ulg", 100).unwrap();
        assert_eq!(file.write_at(50, &expected[50..]).unwrap(), 50);
        assert_eq!(file.write_at(0, &expected[..50]).unwrap(), 50);
        let path = file.finish().unwrap();

        assert_eq!(fs::read(path).unwrap(), expected);
    }

    #[test]
    fn test_duplicate_write_does_not_corrupt() {
        let dir = TempDir::new().unwrap();
        let expected: Vec<u8> = (0..20u8).collect();

        let mut file = LogFile::create(dir.path(), "a.ulg", 20).unwrap();
        file.write_at(0, &expected).unwrap();
        file.write_at(5, &expected[5..10]).unwrap();
        let path = file.finish().unwrap();

        assert_eq!(fs::read(path).unwrap(), expected);
    }

    #[test]
    fn test_write_past_size_is_clamped() {
        let dir = TempDir::new().unwrap();
        let mut file = LogFile::create(dir.path(), "a.ulg", 10).unwrap();
        assert_eq!(file.write_at(5, &[1u8; 10]).unwrap(), 5);
        assert_eq!(file.write_at(10, &[1u8; 10]).unwrap(), 0);
        let path = file.finish().unwrap();
        assert_eq!(fs::metadata(path).unwrap().len(), 10);
    }

    #[test]
    fn test_discard_removes_file() {
        let dir = TempDir::new().unwrap();
        let file = LogFile::create(dir.path(), "a.ulg", 10).unwrap();
        let path = file.path().to_path_buf();
        file.discard();
        assert!(!path.exists());
    }
}
