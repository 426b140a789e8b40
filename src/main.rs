//! Operator CLI for the POS database backup/restore pipeline.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use posbackup::backup::artifact::Artifact;
use posbackup::config::AppConfig;
use posbackup::utils::setting::check_db_connection;
use posbackup::verification::hash_password;
use posbackup::BackupService;

#[derive(Parser)]
#[command(name = "posbackup")]
#[command(about = "Back up and restore the POS database")]
#[command(version)]
struct Cli {
    /// Path to config.json (defaults to $POSBACKUP_CONFIG or ./config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Name recorded in the activity log
    #[arg(long, global = true, default_value = "admin")]
    actor: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Take a manual backup
    Backup,
    /// Restore the database from a backup file in the backup directory
    Restore { file: String },
    /// List backups, oldest first
    List,
    /// Delete one backup
    Delete { file: String },
    /// Copy a backup out of the backup directory
    Export { file: String, destination: PathBuf },
    /// Re-enter the administrator password to start a verified session
    Verify,
    /// End the verified session
    Logout,
    /// Apply the retention policy without taking a backup
    Prune,
    /// Show schedule and backup directory status
    Status,
    /// Print an argon2 hash for `admin_password_hash` in config.json
    HashPassword,
}

/// Read from the environment only, never from argv.
const ADMIN_PASSWORD_ENV: &str = "POSBACKUP_ADMIN_PASSWORD";

impl Commands {
    /// The action name for commands that need a verified session first.
    fn gated_action(&self) -> Option<&'static str> {
        match self {
            Commands::Backup => Some("backup"),
            Commands::Restore { .. } => Some("restore"),
            Commands::List => Some("list"),
            Commands::Delete { .. } => Some("delete"),
            Commands::Export { .. } => Some("export"),
            _ => None,
        }
    }
}

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let password = std::env::var(ADMIN_PASSWORD_ENV).ok().filter(|p| !p.is_empty());
    let command = match cli.command.clone() {
        Some(command) => command,
        None => prompt_choice()?,
    };

    if let Commands::HashPassword = command {
        let password = match password.clone() {
            Some(p) => p,
            None => prompt_line("New administrator password: ")?,
        };
        println!("{}", hash_password(&password)?);
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;
    let service = BackupService::new(app_config, &cli.actor);
    if let Some(action) = command.gated_action() {
        ensure_verified(&service, action, password.as_deref())?;
    }

    match command {
        Commands::Backup => {
            println!("🚀 Starting Backup Process...");
            let mut db = check_db_connection(&service.config().database)
                .await
                .inspect_err(|e| service.log().error(&format!("Backup failed: {}", e)))
                .context("Cannot proceed with backup")?;
            let mut settings = service.open_settings().await?;
            let outcome = service
                .create_backup(&mut db, settings.as_mut())
                .await
                .context("Backup process failed")?;
            println!(
                "📦 Backup created: {} ({}, {})",
                outcome.dump.artifact.file_name,
                human_size(outcome.dump.bytes),
                outcome.dump.strategy
            );
            for name in &outcome.pruned {
                println!("🗑️  Deleted old backup: {}", name);
            }
            let _ = db.close().await;
        }
        Commands::Restore { file } => {
            println!("🔄 Starting Restore Process...");
            let mut db = check_db_connection(&service.config().database)
                .await
                .inspect_err(|e| service.log().error(&format!("Restore failed: {}", e)))
                .context("Cannot proceed with restore")?;
            let report = service
                .restore(&file, &mut db)
                .await
                .context("Restore process failed")?;
            if let Some(safety) = &report.safety_backup {
                println!("🛟 Safety backup taken first: {}", safety);
            }
            println!("✓ Restored {} using {}", report.file_name, report.strategy);
            if let Some(counts) = report.statements {
                println!(
                    "   {} statements executed, {} failed",
                    counts.executed, counts.failed
                );
            }
            if let Some(fragment) = &report.trailing_fragment {
                println!("⚠️ Incomplete statement at end of file was not executed:");
                println!("   {}", fragment.chars().take(120).collect::<String>());
            }
            let _ = db.close().await;
        }
        Commands::List => {
            let artifacts = service.list()?;
            if artifacts.is_empty() {
                println!(
                    "No backups found in {}",
                    service.config().backup_dir.display()
                );
            } else {
                println!("📋 Available backups:");
                for artifact in artifacts.iter().rev() {
                    print_artifact(artifact);
                }
            }
        }
        Commands::Delete { file } => {
            service.delete(&file).context("Delete failed")?;
            println!("🗑️  Deleted {}", file);
        }
        Commands::Export { file, destination } => {
            let target = service
                .export(&file, &destination)
                .context("Export failed")?;
            println!("📤 Exported {} to {}", file, target.display());
        }
        Commands::Verify => {
            let password = match password.clone() {
                Some(p) => p,
                None => prompt_line("🔐 Administrator password: ")?,
            };
            let session = service
                .verifier()
                .confirm(&password, Local::now().naive_local())
                .context("Verification failed")?;
            println!(
                "🔓 Verified for {} minutes (since {})",
                service.config().verification_ttl.num_minutes(),
                session
                    .verified_at
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default()
            );
        }
        Commands::Logout => {
            service.verifier().revoke()?;
            println!("🔒 Verified session ended");
        }
        Commands::Prune => {
            let mut settings = service.open_settings().await?;
            let pruned = service.prune(settings.as_mut()).await.context("Prune failed")?;
            if pruned.is_empty() {
                println!("Nothing to prune");
            }
        }
        Commands::Status => {
            let mut settings = service.open_settings().await?;
            let status = service
                .status(settings.as_mut(), Local::now().naive_local())
                .await?;
            println!("📊 Backup status");
            println!("   Frequency:        {}", status.settings.frequency);
            println!(
                "   Last backup:      {}",
                if status.settings.last_backup_time.is_empty() {
                    "never"
                } else {
                    status.settings.last_backup_time.as_str()
                }
            );
            println!("   Backup due:       {}", if status.backup_due { "yes" } else { "no" });
            println!("   Keep:             {}", status.settings.retention_count);
            println!(
                "   Stored backups:   {} ({})",
                status.artifacts.len(),
                human_size(status.total_bytes())
            );
            if let Some(latest) = status.latest() {
                println!("   Most recent:      {}", latest.file_name);
            }
        }
        Commands::HashPassword => {}
    }
    Ok(())
}

/// Passes when a verified session is live; otherwise asks for the
/// administrator password once.
fn ensure_verified(service: &BackupService, action: &str, password: Option<&str>) -> Result<()> {
    let verifier = service.verifier();
    let now = Local::now().naive_local();
    if verifier.require_verified(action, now).is_ok() {
        return Ok(());
    }

    let password = match password {
        Some(p) => p.to_string(),
        None => prompt_line("🔐 Administrator password: ")?,
    };
    verifier
        .confirm(&password, now)
        .context(format!("Verification required before {}", action))?;
    verifier.require_verified(action, now)?;
    Ok(())
}

fn print_artifact(artifact: &Artifact) {
    println!(
        "   - {} ({}, {})",
        artifact.file_name,
        human_size(artifact.size),
        artifact.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Prompts user to select an operation when none was given on the command line
fn prompt_choice() -> Result<Commands> {
    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    println!("3. List Backups (or type 'list')");
    println!("4. Delete Backup (or type 'delete')");
    println!("5. Show Status (or type 'status')");
    println!("6. Verify Administrator (or type 'verify')");
    let choice = prompt_line("Enter your choice: ")?;

    let command = match choice.as_str() {
        "1" | "backup" => Commands::Backup,
        "2" | "restore" => Commands::Restore {
            file: prompt_line("Backup file to restore: ")?,
        },
        "3" | "list" => Commands::List,
        "4" | "delete" => Commands::Delete {
            file: prompt_line("Backup file to delete: ")?,
        },
        "5" | "status" => Commands::Status,
        "6" | "verify" => Commands::Verify,
        _ => {
            println!("❌ Invalid choice. Please enter a number from 1 to 6.");
            anyhow::bail!("Invalid operation choice");
        }
    };
    Ok(command)
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{stdin, stdout, Write};

    print!("{}", prompt);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
