//! # Rate/Progress Tracker
//!
//! Counts bytes between fixed ticks and turns them into an instantaneous
//! rate plus a smoothed average. The counter resets at every tick.

use tokio::time::Instant;

/// Weight of the previous average when folding in a new sample
const RATE_SMOOTHING: f64 = 0.95;

/// One tick's worth of throughput
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Bytes per second since the previous tick
    pub rate: f64,
    /// Exponentially smoothed bytes per second
    pub avg_rate: f64,
}

#[derive(Debug)]
pub struct RateTracker {
    bytes_since_tick: u64,
    last_tick: Instant,
    avg_rate: f64,
}

impl RateTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            bytes_since_tick: 0,
            last_tick: now,
            avg_rate: 0.0,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.bytes_since_tick += bytes as u64;
    }

    /// Close the current tick window and start the next one
    pub fn tick(&mut self, now: Instant) -> RateSample {
        let elapsed = now.saturating_duration_since(self.last_tick).as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.bytes_since_tick as f64 / elapsed
        } else {
            0.0
        };

        self.avg_rate = self.avg_rate * RATE_SMOOTHING + rate * (1.0 - RATE_SMOOTHING);
        self.bytes_since_tick = 0;
        self.last_tick = now;

        RateSample {
            rate,
            avg_rate: self.avg_rate,
        }
    }
}

/// Completion fraction in `[0.0, 1.0]`; an empty log counts as complete
pub fn fraction(received: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (received as f64 / total as f64).min(1.0)
}

/// Human readable byte count ("512 B", "45.0 KB", "1.2 MB")
pub fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes < KB {
        format!("{:.0} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes / KB)
    } else if bytes < GB {
        format!("{:.1} MB", bytes / MB)
    } else {
        format!("{:.2} GB", bytes / GB)
    }
}

/// Status line shown for an entry while it downloads
pub fn progress_text(written: u64, avg_rate: f64) -> String {
    format!("{} ({}/s)", format_bytes(written as f64), format_bytes(avg_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[test]
    fn test_rate_over_one_second() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(start);
        tracker.record(900);
        tracker.record(100);

        let sample = tracker.tick(start + Duration::from_secs(1));
        assert!((sample.rate - 1000.0).abs() < 1e-6);
        assert!((sample.avg_rate - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_counter_resets_each_tick() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(start);
        tracker.record(1000);
        tracker.tick(start + Duration::from_secs(1));

        let sample = tracker.tick(start + Duration::from_secs(2));
        assert_eq!(sample.rate, 0.0);
        // Average decays instead of resetting
        assert!(sample.avg_rate > 0.0 && sample.avg_rate < 50.0);
    }

    #[test]
    fn test_zero_elapsed_gives_zero_rate() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(start);
        tracker.record(500);
        let sample = tracker.tick(start);
        assert_eq!(sample.rate, 0.0);
    }

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(0, 100), 0.0);
        assert_eq!(fraction(50, 100), 0.5);
        assert_eq!(fraction(100, 100), 1.0);
        assert_eq!(fraction(0, 0), 1.0);
        assert_eq!(fraction(150, 100), 1.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(46080.0), "45.0 KB");
        assert_eq!(format_bytes(1.5 * 1024.0 * 1024.0), "1.5 MB");
        assert_eq!(format_bytes(2.0 * 1024.0 * 1024.0 * 1024.0), "2.00 GB");
    }

    #[test]
    fn test_progress_text() {
        assert_eq!(progress_text(2048, 1024.0), "2.0 KB (1.0 KB/s)");
    }
}
