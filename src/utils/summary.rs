//! Scalar summaries for a training run.
//!
//! Each call to [`SummaryWriter::add_scalar`] appends one JSON object per line
//! to `scalars.jsonl` inside the run directory.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// File name of the scalar log inside a run directory
pub const SCALARS_FILE: &str = "scalars.jsonl";

/// One logged scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub step: usize,
    pub value: f64,
}

/// Append-only scalar writer
pub struct SummaryWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SummaryWriter {
    /// Open (or create) the scalar log in `logdir`
    pub fn new(logdir: &Path) -> Result<Self> {
        std::fs::create_dir_all(logdir)?;
        let path = logdir.join(SCALARS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            step,
            value,
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read back every event from a scalar log
pub fn read_scalars(path: &Path) -> Result<Vec<ScalarEvent>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SummaryWriter::new(dir.path()).unwrap();
        writer.add_scalar("train/loss", 1.25, 0).unwrap();
        writer.add_scalar("test/acc", 0.5, 0).unwrap();
        writer.add_scalar("train/loss", 0.75, 1).unwrap();
        writer.flush().unwrap();

        let events = read_scalars(writer.path()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].tag, "test/acc");
        assert_eq!(events[2].step, 1);
        assert!((events[2].value - 0.75).abs() < 1e-12);
    }
}
