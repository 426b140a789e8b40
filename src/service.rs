// posbackup/src/service.rs
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

use crate::activity_log::ActivityLog;
use crate::backup::artifact::{list_artifacts, Artifact, ArtifactKind};
use crate::backup::{run_backup_flow, BackupOutcome};
use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::{BackupError, Result};
use crate::lock::OperationLock;
use crate::restore::{perform_restore_orchestration, validate_artifact_reference, RestoreReport};
use crate::retention::{apply_retention, apply_safety_copy_retention};
use crate::scheduler::{is_backup_needed, run_scheduled_backup, ScheduleOutcome};
use crate::settings::{open_store, BackupSettings, SettingsStore};
use crate::utils::locator::{SystemLocator, ToolLocator};
use crate::verification::{SessionStore, Verifier};

/// Snapshot of the schedule and the backup directory.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub settings: BackupSettings,
    pub backup_due: bool,
    pub artifacts: Vec<Artifact>,
}

impl StatusReport {
    pub fn latest(&self) -> Option<&Artifact> {
        self.artifacts.last()
    }

    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size).sum()
    }
}

/// The operations behind every entry point, bound to one configuration and
/// one actor name in the activity log.
pub struct BackupService {
    config: AppConfig,
    locator: Box<dyn ToolLocator>,
    log: ActivityLog,
}

impl BackupService {
    pub fn new(config: AppConfig, actor: &str) -> Self {
        let locator = SystemLocator::for_platform(&config.tool_overrides);
        Self::with_locator(config, Box::new(locator), actor)
    }

    pub fn with_locator(config: AppConfig, locator: Box<dyn ToolLocator>, actor: &str) -> Self {
        let log = ActivityLog::new(config.activity_log_path(), actor);
        BackupService {
            config,
            locator,
            log,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn verifier(&self) -> Verifier {
        Verifier::new(
            SessionStore::new(self.config.session_path()),
            ActivityLog::new(self.config.security_log_path(), self.log.actor()),
            self.config.admin_password_hash.clone(),
            self.config.verification_ttl,
        )
    }

    pub async fn create_backup(
        &self,
        db: &mut dyn Database,
        settings: &mut dyn SettingsStore,
    ) -> Result<BackupOutcome> {
        run_backup_flow(
            &self.config,
            ArtifactKind::Manual,
            self.locator.as_ref(),
            db,
            settings,
            &self.log,
        )
        .await
    }

    pub async fn run_scheduled(
        &self,
        db: &mut dyn Database,
        settings: &mut dyn SettingsStore,
        now: NaiveDateTime,
    ) -> Result<ScheduleOutcome> {
        run_scheduled_backup(&self.config, self.locator.as_ref(), db, settings, &self.log, now).await
    }

    pub async fn restore(&self, file_name: &str, db: &mut dyn Database) -> Result<RestoreReport> {
        perform_restore_orchestration(&self.config, file_name, self.locator.as_ref(), db, &self.log)
            .await
    }

    /// Artifacts oldest first.
    pub fn list(&self) -> Result<Vec<Artifact>> {
        list_artifacts(&self.config.backup_dir, &self.config.product_name)
    }

    pub fn delete(&self, file_name: &str) -> Result<()> {
        let _lock = OperationLock::acquire(&self.config.lock_path())
            .inspect_err(|e| self.log.error(&format!("Delete failed: {}", e)))?;
        let artifact = self
            .resolve(file_name)
            .inspect_err(|e| self.log.error(&format!("Delete rejected: {}", e)))?;

        fs::remove_file(&artifact.path)
            .map_err(|e| BackupError::write_failed(&artifact.path, e))
            .inspect_err(|e| self.log.error(&format!("Delete failed: {}", e)))?;
        self.log
            .success(&format!("Deleted backup: {}", artifact.file_name));
        Ok(())
    }

    /// Copies an artifact out of the backup directory. `destination` may be
    /// a directory or a file path; an existing file is never overwritten.
    pub fn export(&self, file_name: &str, destination: &Path) -> Result<PathBuf> {
        let artifact = self
            .resolve(file_name)
            .inspect_err(|e| self.log.error(&format!("Export rejected: {}", e)))?;

        let target = if destination.is_dir() {
            destination.join(&artifact.file_name)
        } else {
            destination.to_path_buf()
        };
        if target.exists() {
            let err = BackupError::write_failed(
                &target,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file already exists"),
            );
            self.log.error(&format!("Export failed: {}", err));
            return Err(err);
        }

        fs::copy(&artifact.path, &target)
            .map_err(|e| BackupError::write_failed(&target, e))
            .inspect_err(|e| self.log.error(&format!("Export failed: {}", e)))?;
        self.log.info(&format!(
            "Exported backup {} to {}",
            artifact.file_name,
            target.display()
        ));
        Ok(target)
    }

    /// Opens the configured settings store, recording a failure in the
    /// activity log.
    pub async fn open_settings(&self) -> Result<Box<dyn SettingsStore>> {
        open_store(&self.config)
            .await
            .inspect_err(|e| self.log.error(&format!("Failed to open backup settings: {}", e)))
    }

    /// Applies both retention caps without taking a new backup.
    pub async fn prune(&self, settings: &mut dyn SettingsStore) -> Result<Vec<String>> {
        let _lock = OperationLock::acquire(&self.config.lock_path())
            .inspect_err(|e| self.log.error(&format!("Prune failed: {}", e)))?;
        let loaded = BackupSettings::load(settings)
            .await
            .inspect_err(|e| self.log.error(&format!("Prune failed: {}", e)))?;
        let mut pruned = apply_retention(
            &self.config.backup_dir,
            &self.config.product_name,
            loaded.retention_count,
            &self.log,
        )?;
        pruned.extend(apply_safety_copy_retention(
            &self.config.backup_dir,
            &self.config.product_name,
            self.config.pre_restore_keep_count,
            &self.log,
        )?);
        Ok(pruned)
    }

    pub async fn status(
        &self,
        settings: &mut dyn SettingsStore,
        now: NaiveDateTime,
    ) -> Result<StatusReport> {
        let loaded = BackupSettings::load(settings).await?;
        let backup_due = is_backup_needed(loaded.frequency, &loaded.last_backup_time, now);
        Ok(StatusReport {
            settings: loaded,
            backup_due,
            artifacts: self.list()?,
        })
    }

    fn resolve(&self, file_name: &str) -> Result<Artifact> {
        validate_artifact_reference(&self.config.backup_dir, &self.config.product_name, file_name)
    }
}
