use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{tool} executable not found (tried: {})", tried.join(", "))]
    ToolNotFound { tool: String, tried: Vec<String> },

    #[error("{program} failed with {status}: {stderr}")]
    ProcessExecutionFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to write {}: {source}", path.display())]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Statement failed: {0}")]
    StatementExecutionFailed(String),

    #[error("Restore aborted at statement {statement}: {message}")]
    CriticalRestoreFailure { statement: usize, message: String },

    #[error("Invalid backup file: {0}")]
    InvalidArtifact(String),

    #[error("Another backup or restore operation is in progress ({})", lock_path.display())]
    Busy { lock_path: PathBuf },

    #[error("Verification required: {0}")]
    VerificationRequired(String),
}

impl BackupError {
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Whether the dump/restore pipeline may answer this error by switching
    /// to the in-process strategy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BackupError::ToolNotFound { .. } | BackupError::ProcessExecutionFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
