//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Running averages and evaluation metrics
//! - Scalar summaries written to the run directory
//! - Error handling types
//! - Run directory naming

pub mod error;
pub mod logging;
pub mod metrics;
pub mod summary;

use std::path::{Path, PathBuf};

use chrono::Local;

// Re-export main types for convenience
pub use error::{NoisyMatchError, Result};
pub use logging::init_logging;
pub use metrics::{AverageMeter, ConfusionMatrix, Metrics};
pub use summary::SummaryWriter;

/// Timestamp format used in run directory names
pub const ISO_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Current local time formatted as `%Y%m%d_%H%M%S`
pub fn make_timestamp() -> String {
    Local::now().format(ISO_TIMESTAMP).to_string()
}

/// Run directory `<out_dir>/<timestamp>-<seed>`
pub fn run_dir(out_dir: &Path, timestamp: &str, seed: u64) -> PathBuf {
    out_dir.join(format!("{}-{}", timestamp, seed))
}

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_make_timestamp_shape() {
        let ts = make_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.as_bytes()[8], b'_');
        assert!(ts.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_run_dir_naming() {
        let dir = run_dir(Path::new("output"), "20240102_030405", 7);
        assert_eq!(dir, PathBuf::from("output/20240102_030405-7"));
    }
}
