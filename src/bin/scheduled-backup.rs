//! Scheduler entry point, run from cron or Task Scheduler. Takes no
//! arguments; prints INFO/SUCCESS/ERROR lines and exits 1 on failure.

use anyhow::{Context, Result};
use chrono::Local;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use posbackup::config::AppConfig;
use posbackup::scheduler::ScheduleOutcome;
use posbackup::db::mysql::MySqlDatabase;
use posbackup::BackupService;

const ACTOR: &str = "scheduler";

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config_path = AppConfig::default_path();
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load configuration from {}",
        config_path.display()
    ))?;
    let service = BackupService::new(app_config, ACTOR);

    println!("INFO: Checking backup schedule");
    let mut db = MySqlDatabase::connect(&service.config().database)
        .await
        .inspect_err(|e| service.log().error(&format!("Scheduled backup failed: {}", e)))
        .context("Database unavailable")?;
    let mut settings = service.open_settings().await?;

    let outcome = service
        .run_scheduled(&mut db, settings.as_mut(), Local::now().naive_local())
        .await
        .context("Scheduled backup failed")?;

    match outcome {
        ScheduleOutcome::NotNeeded {
            frequency,
            last_backup_time,
        } => {
            println!(
                "INFO: Backup not needed (frequency: {}, last backup: {})",
                frequency,
                if last_backup_time.is_empty() {
                    "never"
                } else {
                    last_backup_time.as_str()
                }
            );
        }
        ScheduleOutcome::Completed(backup) => {
            println!(
                "SUCCESS: Scheduled backup created: {} ({} bytes, {})",
                backup.dump.artifact.file_name, backup.dump.bytes, backup.dump.strategy
            );
            for name in &backup.pruned {
                println!("INFO: Deleted old backup: {}", name);
            }
        }
    }

    let _ = db.close().await;
    Ok(())
}
