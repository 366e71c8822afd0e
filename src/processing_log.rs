//! Append-only progress log of one video.
//!
//! External observers tail the video folder's `log.txt` to follow a run
//! (see [`LogFollower`](crate::LogFollower) with the `async` feature).

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::PipelineError;

/// Writes timestamped lines to a log file and mirrors them to `log::info!`.
#[derive(Debug, Clone)]
pub struct ProcessingLog {
    path: PathBuf,
}

impl ProcessingLog {
    /// A log writing to `path`. The file is created on first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line.
    pub fn append(&self, message: impl AsRef<str>) -> Result<(), PipelineError> {
        let message = message.as_ref();
        log::info!("{message}");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(
            file,
            "[{}] {message}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        Ok(())
    }

    /// Every line written so far. A missing file reads as empty.
    pub fn read_lines(&self) -> Result<Vec<String>, PipelineError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }
}
