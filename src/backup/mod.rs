pub mod artifact;
pub(crate) mod db_dump;
pub(crate) mod fallback;
mod logic;

pub use logic::{produce_dump, DumpTarget};

use std::fmt;

use crate::activity_log::ActivityLog;
use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::Result;
use crate::lock::OperationLock;
use crate::retention::apply_retention;
use crate::settings::{advance_last_backup_time, BackupSettings, SettingsStore};
use crate::utils::locator::ToolLocator;
use artifact::{Artifact, ArtifactKind};

/// Which of the two dump/load paths produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The `mysqldump` / `mysql` command-line tools.
    Native,
    /// SQL generated or replayed over the application's own connection.
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Native => f.write_str("native"),
            Strategy::Fallback => f.write_str("in-process fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub artifact: Artifact,
    pub strategy: Strategy,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub dump: DumpOutcome,
    pub pruned: Vec<String>,
}

/// Public entry point for a manual or scheduled backup: takes the operation
/// lock, writes the artifact, records `last_backup_time` and applies
/// retention.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    kind: ArtifactKind,
    locator: &dyn ToolLocator,
    db: &mut dyn Database,
    settings: &mut dyn SettingsStore,
    log: &ActivityLog,
) -> Result<BackupOutcome> {
    let _lock = OperationLock::acquire(&app_config.lock_path())
        .inspect_err(|e| log.error(&format!("Backup failed: {}", e)))?;

    let target = DumpTarget {
        backup_dir: &app_config.backup_dir,
        product: &app_config.product_name,
        kind,
    };
    let dump = produce_dump(&target, &app_config.database, locator, db, log).await?;

    let recorded = advance_last_backup_time(settings, dump.artifact.created_at)
        .await
        .inspect_err(|e| log.error(&format!("Failed to record last backup time: {}", e)))?;
    if !recorded {
        tracing::debug!("last_backup_time already at or past this backup");
    }

    let retention_count = BackupSettings::load(settings)
        .await
        .inspect_err(|e| log.error(&format!("Failed to read retention settings: {}", e)))?
        .retention_count;
    let pruned = apply_retention(
        &app_config.backup_dir,
        &app_config.product_name,
        retention_count,
        log,
    )?;

    Ok(BackupOutcome { dump, pruned })
}
