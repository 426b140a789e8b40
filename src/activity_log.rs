//! Append-only operation log shared by every backup process.

use chrono::Local;
use fs2::FileExt;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{BackupError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Writes `[timestamp] [LEVEL] [actor] message` lines to a single file.
///
/// Each append takes an exclusive OS lock on the file, so lines written by
/// the web-triggered and scheduler-triggered processes never interleave.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    actor: String,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>, actor: impl Into<String>) -> Self {
        ActivityLog {
            path: path.into(),
            actor: actor.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Same file, different actor.
    pub fn for_actor(&self, actor: impl Into<String>) -> Self {
        ActivityLog::new(self.path.clone(), actor)
    }

    pub fn append(&self, level: LogLevel, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BackupError::write_failed(parent, e))?;
            }
        }

        let line = format_line(
            &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level,
            &self.actor,
            message,
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BackupError::write_failed(&self.path, e))?;
        file.lock_exclusive()
            .map_err(|e| BackupError::write_failed(&self.path, e))?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);
        written.map_err(|e| BackupError::write_failed(&self.path, e))
    }

    pub fn info(&self, message: &str) {
        self.record(LogLevel::Info, message);
    }

    pub fn success(&self, message: &str) {
        self.record(LogLevel::Success, message);
    }

    pub fn error(&self, message: &str) {
        self.record(LogLevel::Error, message);
    }

    // A broken log file must not abort the operation it is observing.
    fn record(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(actor = %self.actor, "{}", message),
            _ => tracing::info!(actor = %self.actor, "{}", message),
        }
        if let Err(e) = self.append(level, message) {
            tracing::warn!("Could not write to {}: {}", self.path.display(), e);
        }
    }
}

fn format_line(timestamp: &str, level: LogLevel, actor: &str, message: &str) -> String {
    // One entry per line, whatever the message contains.
    let message = message.replace(['\r', '\n'], " ");
    format!("[{}] [{}] [{}] {}\n", timestamp, level, actor, message)
}
