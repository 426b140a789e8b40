// posbackup/src/backup/db_dump.rs
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::DatabaseConfig;
use crate::errors::{BackupError, Result};

/// Flags for a transactionally consistent dump including routines, triggers
/// and events. The password never appears here; it travels in `MYSQL_PWD`.
pub fn mysqldump_args(db: &DatabaseConfig) -> Vec<String> {
    let mut args = vec![
        "--single-transaction".to_string(),
        "--routines".to_string(),
        "--triggers".to_string(),
        "--events".to_string(),
        "--add-drop-table".to_string(),
        "--hex-blob".to_string(),
        "--default-character-set=utf8mb4".to_string(),
        "--host".to_string(),
        db.host.clone(),
        "--port".to_string(),
        db.port.to_string(),
    ];
    if !db.user.is_empty() {
        args.push("--user".to_string());
        args.push(db.user.clone());
    }
    args.push(db.database.clone());
    args
}

/// Runs `mysqldump` with its stdout redirected into `output` and returns the
/// size of the written file. A failed or empty dump is an error; the caller
/// owns cleanup of `output`.
pub async fn dump_with_mysqldump(
    mysqldump_path: &Path,
    db: &DatabaseConfig,
    output: &Path,
) -> Result<u64> {
    let mysqldump_path = mysqldump_path.to_path_buf();
    let db = db.clone();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || run_mysqldump(&mysqldump_path, &db, &output))
        .await
        .map_err(|e| BackupError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

fn run_mysqldump(mysqldump_path: &Path, db: &DatabaseConfig, output: &Path) -> Result<u64> {
    tracing::info!(
        "Dumping database {} with {} to {}",
        db.database,
        mysqldump_path.display(),
        output.display()
    );

    let out_file = File::create(output).map_err(|e| BackupError::write_failed(output, e))?;

    let mut command = Command::new(mysqldump_path);
    command
        .args(mysqldump_args(db))
        .stdout(Stdio::from(out_file))
        .stderr(Stdio::piped());
    if let Some(password) = &db.password {
        command.env("MYSQL_PWD", password);
    }

    let program = mysqldump_path.display().to_string();
    let result = command
        .output()
        .map_err(|e| BackupError::ProcessExecutionFailed {
            program: program.clone(),
            status: "not started".to_string(),
            stderr: e.to_string(),
        })?;

    if !result.status.success() {
        return Err(BackupError::ProcessExecutionFailed {
            program,
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    let size = fs::metadata(output)
        .map_err(|e| BackupError::read_failed(output, e))?
        .len();
    if size == 0 {
        return Err(BackupError::ProcessExecutionFailed {
            program,
            status: result.status.to_string(),
            stderr: "mysqldump produced an empty file".to_string(),
        });
    }

    tracing::info!("✓ mysqldump wrote {} bytes", size);
    Ok(size)
}
