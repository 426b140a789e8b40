// posbackup/src/backup/logic.rs
use chrono::Local;
use std::fs;
use std::path::Path;

use super::artifact::{reserve_artifact_path, Artifact, ArtifactKind};
use super::{db_dump, fallback, DumpOutcome, Strategy};
use crate::activity_log::ActivityLog;
use crate::config::DatabaseConfig;
use crate::db::Database;
use crate::errors::{BackupError, Result};
use crate::utils::locator::{DbTool, ToolLocator};

/// Everything the dump producer needs to write one artifact.
pub struct DumpTarget<'a> {
    pub backup_dir: &'a Path,
    pub product: &'a str,
    pub kind: ArtifactKind,
}

/// Writes one new artifact, trying `mysqldump` first and switching to the
/// in-process serializer when the tool is missing or fails. A partially
/// written file never survives a failure.
pub async fn produce_dump(
    target: &DumpTarget<'_>,
    db_config: &DatabaseConfig,
    locator: &dyn ToolLocator,
    db: &mut dyn Database,
    log: &ActivityLog,
) -> Result<DumpOutcome> {
    let created_at = Local::now().naive_local();
    let path = reserve_artifact_path(target.backup_dir, target.product, target.kind, created_at)
        .inspect_err(|e| log.error(&format!("Backup failed: {}", e)))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    log.info(&format!("Creating {} backup {}", target.kind.tag(), file_name));

    let native = match locator.locate(DbTool::Dump) {
        Ok(mysqldump) => db_dump::dump_with_mysqldump(&mysqldump, db_config, &path).await,
        Err(e) => Err(e),
    };

    let strategy = match native {
        Ok(_) => Strategy::Native,
        Err(e) if e.is_recoverable() => {
            log.info(&format!(
                "mysqldump unavailable, using in-process dump instead: {}",
                e
            ));
            match fallback::write_sql_dump(db, &path, target.product, created_at).await {
                Ok(_) => Strategy::Fallback,
                Err(e) => return Err(discard(&path, e, log)),
            }
        }
        Err(e) => return Err(discard(&path, e, log)),
    };

    let artifact = Artifact::from_path(target.product, &path).map_err(|e| discard(&path, e, log))?;
    if artifact.size == 0 {
        let empty = BackupError::InvalidArtifact(format!("{} is empty", artifact.file_name));
        return Err(discard(&path, empty, log));
    }

    log.success(&format!(
        "Backup created: {} ({} bytes, {})",
        artifact.file_name, artifact.size, strategy
    ));
    let bytes = artifact.size;
    Ok(DumpOutcome {
        artifact,
        strategy,
        bytes,
    })
}

fn discard(path: &Path, error: BackupError, log: &ActivityLog) -> BackupError {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove partial backup {}: {}", path.display(), e);
        }
    }
    log.error(&format!("Backup failed: {}", error));
    error
}
