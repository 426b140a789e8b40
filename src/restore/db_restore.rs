// posbackup/src/restore/db_restore.rs
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::DatabaseConfig;
use crate::errors::{BackupError, Result};

/// Client flags for loading a dump. Foreign key checks are switched off for
/// the client session only, so tables can be recreated in any order.
pub fn mysql_args(db: &DatabaseConfig) -> Vec<String> {
    let mut args = vec![
        "--host".to_string(),
        db.host.clone(),
        "--port".to_string(),
        db.port.to_string(),
        "--default-character-set=utf8mb4".to_string(),
        "--init-command=SET FOREIGN_KEY_CHECKS=0".to_string(),
    ];
    if !db.user.is_empty() {
        args.push("--user".to_string());
        args.push(db.user.clone());
    }
    args.push(db.database.clone());
    args
}

/// Feeds `script` to the `mysql` client on stdin.
pub async fn restore_with_mysql(mysql_path: &Path, db: &DatabaseConfig, script: &Path) -> Result<()> {
    let mysql_path = mysql_path.to_path_buf();
    let db = db.clone();
    let script = script.to_path_buf();

    tokio::task::spawn_blocking(move || run_mysql(&mysql_path, &db, &script))
        .await
        .map_err(|e| BackupError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

fn run_mysql(mysql_path: &Path, db: &DatabaseConfig, script: &Path) -> Result<()> {
    tracing::info!(
        "Executing {} with {} on database {}",
        script.display(),
        mysql_path.display(),
        db.database
    );

    let input = File::open(script).map_err(|e| BackupError::read_failed(script, e))?;

    let mut command = Command::new(mysql_path);
    command
        .args(mysql_args(db))
        .stdin(Stdio::from(input))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(password) = &db.password {
        command.env("MYSQL_PWD", password);
    }

    let program = mysql_path.display().to_string();
    let output = command
        .output()
        .map_err(|e| BackupError::ProcessExecutionFailed {
            program: program.clone(),
            status: "not started".to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(BackupError::ProcessExecutionFailed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    tracing::info!("✓ Successfully executed {} with mysql", script.display());
    Ok(())
}
