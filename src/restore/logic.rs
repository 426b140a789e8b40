// posbackup/src/restore/logic.rs
use std::fs;

use super::executor::execute_script;
use super::statements::split_statements;
use super::verification::validate_artifact_reference;
use super::{db_restore, RestoreReport};
use crate::activity_log::ActivityLog;
use crate::backup::artifact::{Artifact, ArtifactKind};
use crate::backup::{produce_dump, DumpTarget, Strategy};
use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::{BackupError, Result};
use crate::lock::OperationLock;
use crate::retention::apply_safety_copy_retention;
use crate::utils::locator::{DbTool, ToolLocator};

/// Validates the reference, takes a safety dump when configured, then loads
/// the artifact with the `mysql` client or, failing that, replays it over
/// the application connection.
pub async fn perform_restore_orchestration(
    app_config: &AppConfig,
    file_name: &str,
    locator: &dyn ToolLocator,
    db: &mut dyn Database,
    log: &ActivityLog,
) -> Result<RestoreReport> {
    let _lock = OperationLock::acquire(&app_config.lock_path())
        .inspect_err(|e| log.error(&format!("Restore failed: {}", e)))?;

    let artifact =
        validate_artifact_reference(&app_config.backup_dir, &app_config.product_name, file_name)
            .inspect_err(|e| log.error(&format!("Restore rejected: {}", e)))?;

    log.info(&format!("Restore requested from {}", artifact.file_name));

    let safety_backup = if app_config.pre_restore_backup {
        let target = DumpTarget {
            backup_dir: &app_config.backup_dir,
            product: &app_config.product_name,
            kind: ArtifactKind::PreRestore,
        };
        let outcome = produce_dump(&target, &app_config.database, locator, db, log)
            .await
            .inspect_err(|e| {
                log.error(&format!(
                    "Restore aborted, safety backup could not be taken: {}",
                    e
                ))
            })?;
        if let Err(e) = apply_safety_copy_retention(
            &app_config.backup_dir,
            &app_config.product_name,
            app_config.pre_restore_keep_count,
            log,
        ) {
            log.error(&format!("Failed to prune old safety backups: {}", e));
        }
        Some(outcome.artifact.file_name)
    } else {
        None
    };

    let native = match locator.locate(DbTool::Client) {
        Ok(mysql) => db_restore::restore_with_mysql(&mysql, &app_config.database, &artifact.path).await,
        Err(e) => Err(e),
    };

    let mut report = match native {
        Ok(()) => RestoreReport {
            file_name: artifact.file_name.clone(),
            strategy: Strategy::Native,
            safety_backup: None,
            statements: None,
            trailing_fragment: None,
        },
        Err(e) if e.is_recoverable() => {
            log.info(&format!(
                "mysql client unavailable, replaying statements instead: {}",
                e
            ));
            replay_artifact(&artifact, db)
                .await
                .inspect_err(|e| log.error(&format!("Restore failed: {}", e)))?
        }
        Err(e) => {
            log.error(&format!("Restore failed: {}", e));
            return Err(e);
        }
    };
    report.safety_backup = safety_backup;

    if let Some(fragment) = &report.trailing_fragment {
        log.error(&format!(
            "Ignored incomplete statement at end of {}: {}",
            artifact.file_name,
            fragment.chars().take(80).collect::<String>()
        ));
    }
    match report.statements {
        Some(counts) if counts.failed > 0 => log.success(&format!(
            "Database restored from {} ({}, {} statements executed, {} failed)",
            artifact.file_name, report.strategy, counts.executed, counts.failed
        )),
        Some(counts) => log.success(&format!(
            "Database restored from {} ({}, {} statements executed)",
            artifact.file_name, report.strategy, counts.executed
        )),
        None => log.success(&format!(
            "Database restored from {} ({})",
            artifact.file_name, report.strategy
        )),
    }
    Ok(report)
}

async fn replay_artifact(artifact: &Artifact, db: &mut dyn Database) -> Result<RestoreReport> {
    let script = fs::read_to_string(&artifact.path)
        .map_err(|e| BackupError::read_failed(&artifact.path, e))?;
    let parsed = split_statements(&script);
    tracing::info!(
        "Replaying {} statements from {}",
        parsed.statements.len(),
        artifact.file_name
    );

    let counts = execute_script(db, &parsed).await?;
    Ok(RestoreReport {
        file_name: artifact.file_name.clone(),
        strategy: Strategy::Fallback,
        safety_backup: None,
        statements: Some(counts),
        trailing_fragment: parsed.trailing_fragment,
    })
}
