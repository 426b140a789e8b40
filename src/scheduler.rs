// posbackup/src/scheduler.rs
use chrono::NaiveDateTime;

use crate::activity_log::ActivityLog;
use crate::backup::artifact::ArtifactKind;
use crate::backup::{run_backup_flow, BackupOutcome};
use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::Result;
use crate::settings::{parse_timestamp, BackupFrequency, BackupSettings, SettingsStore};
use crate::utils::locator::ToolLocator;

/// Whether a scheduled backup is due at `now`. A missing or unreadable last
/// backup time counts as due for every frequency except `never`.
pub fn is_backup_needed(frequency: BackupFrequency, last_backup_time: &str, now: NaiveDateTime) -> bool {
    let Some(interval) = frequency.interval() else {
        return false;
    };
    if last_backup_time.trim().is_empty() {
        return true;
    }
    match parse_timestamp(last_backup_time) {
        Some(last) => now.signed_duration_since(last) >= interval,
        None => {
            tracing::warn!(
                "Unreadable last_backup_time '{}'; treating backup as due",
                last_backup_time
            );
            true
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScheduleOutcome {
    NotNeeded {
        frequency: BackupFrequency,
        last_backup_time: String,
    },
    Completed(BackupOutcome),
}

/// One scheduler tick: load the schedule, decide, and run a scheduled backup
/// when one is due.
pub async fn run_scheduled_backup(
    app_config: &AppConfig,
    locator: &dyn ToolLocator,
    db: &mut dyn Database,
    settings: &mut dyn SettingsStore,
    log: &ActivityLog,
    now: NaiveDateTime,
) -> Result<ScheduleOutcome> {
    let schedule = BackupSettings::load(settings)
        .await
        .inspect_err(|e| log.error(&format!("Failed to read backup settings: {}", e)))?;

    if !is_backup_needed(schedule.frequency, &schedule.last_backup_time, now) {
        return Ok(ScheduleOutcome::NotNeeded {
            frequency: schedule.frequency,
            last_backup_time: schedule.last_backup_time,
        });
    }

    log.info(&format!(
        "Scheduled backup due (frequency: {}, last backup: {})",
        schedule.frequency,
        if schedule.last_backup_time.is_empty() {
            "never"
        } else {
            schedule.last_backup_time.as_str()
        }
    ));
    let outcome =
        run_backup_flow(app_config, ArtifactKind::Scheduled, locator, db, settings, log).await?;
    Ok(ScheduleOutcome::Completed(outcome))
}
