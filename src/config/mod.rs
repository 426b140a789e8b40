// posbackup/src/config/mod.rs
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::errors::{BackupError, Result};

const DEFAULT_BACKUP_DIR: &str = "./backups";
const DEFAULT_PRODUCT_NAME: &str = "pos";
const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_VERIFICATION_MINUTES: i64 = 30;
const DEFAULT_PRE_RESTORE_KEEP: usize = 3;
pub const CONFIG_PATH_ENV: &str = "POSBACKUP_CONFIG";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database_url: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub product_name: Option<String>,
    pub mysqldump_path: Option<PathBuf>,
    pub mysql_path: Option<PathBuf>,
    pub settings_source: Option<String>,
    pub settings_file: Option<PathBuf>,
    pub pre_restore_backup: Option<bool>,
    pub pre_restore_keep_count: Option<usize>,
    pub admin_password_hash: Option<String>,
    pub verification_timeout_minutes: Option<i64>,
}

/// Connection details for the application database, split out of the URL
/// so the native tools can receive them as flags.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOverrides {
    pub dump: Option<PathBuf>,
    pub client: Option<PathBuf>,
}

/// Where `backup_frequency`, `last_backup_time` and `backup_retention_count` live.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsSource {
    Database,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub backup_dir: PathBuf,
    pub product_name: String,
    pub tool_overrides: ToolOverrides,
    pub settings_source: SettingsSource,
    pub pre_restore_backup: bool,
    /// Safety copies kept after each restore; 0 keeps them all.
    pub pre_restore_keep_count: usize,
    pub admin_password_hash: Option<String>,
    pub verification_ttl: chrono::Duration,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .map_err(|e| BackupError::read_failed(config_path, e))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content).map_err(|e| {
            BackupError::Config(format!(
                "Failed to parse JSON from config file at {}: {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_raw(raw)
    }

    /// Resolves the path named by `POSBACKUP_CONFIG`, or `config.json` in the
    /// working directory.
    pub fn default_path() -> PathBuf {
        env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"))
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let database_url = match raw.database_url.filter(|s| !s.trim().is_empty()) {
            Some(url) => url,
            None => env::var("DATABASE_URL").map_err(|_| {
                BackupError::Config(
                    "database_url must be set in config.json or DATABASE_URL in the environment"
                        .to_string(),
                )
            })?,
        };
        let database = DatabaseConfig::from_url(&database_url)?;

        let backup_dir = raw
            .backup_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
        if backup_dir.as_os_str().is_empty() {
            return Err(BackupError::Config(
                "backup_dir cannot be empty in config.json.".to_string(),
            ));
        }

        let product_name = raw
            .product_name
            .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string());
        validate_product_name(&product_name)?;

        let settings_source = parse_settings_source(
            raw.settings_source.as_deref(),
            raw.settings_file,
            &backup_dir,
        )?;

        let minutes = raw
            .verification_timeout_minutes
            .unwrap_or(DEFAULT_VERIFICATION_MINUTES);
        if minutes <= 0 {
            return Err(BackupError::Config(
                "verification_timeout_minutes must be positive".to_string(),
            ));
        }

        Ok(AppConfig {
            database,
            backup_dir,
            product_name,
            tool_overrides: ToolOverrides {
                dump: raw.mysqldump_path.filter(|p| !p.as_os_str().is_empty()),
                client: raw.mysql_path.filter(|p| !p.as_os_str().is_empty()),
            },
            settings_source,
            pre_restore_backup: raw.pre_restore_backup.unwrap_or(true),
            pre_restore_keep_count: raw
                .pre_restore_keep_count
                .unwrap_or(DEFAULT_PRE_RESTORE_KEEP),
            admin_password_hash: raw.admin_password_hash.filter(|s| !s.is_empty()),
            verification_ttl: chrono::Duration::minutes(minutes),
        })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.backup_dir.join("logs")
    }

    pub fn activity_log_path(&self) -> PathBuf {
        self.logs_dir().join("backup_log.txt")
    }

    pub fn security_log_path(&self) -> PathBuf {
        self.logs_dir().join("security.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.backup_dir.join(".operation.lock")
    }

    pub fn session_path(&self) -> PathBuf {
        self.backup_dir.join(".verification.json")
    }
}

impl DatabaseConfig {
    pub fn from_url(database_url: &str) -> Result<Self> {
        let parsed = Url::parse(database_url)
            .map_err(|e| BackupError::Config(format!("Invalid database URL: {}", e)))?;
        if parsed.scheme() != "mysql" && parsed.scheme() != "mariadb" {
            return Err(BackupError::Config(format!(
                "Unsupported database URL scheme '{}', expected mysql://",
                parsed.scheme()
            )));
        }
        let database = decode_component(parsed.path().trim_start_matches('/'))?;
        if database.is_empty() {
            return Err(BackupError::Config(
                "Database name not found in database URL path".to_string(),
            ));
        }

        Ok(DatabaseConfig {
            url: database_url.to_string(),
            host: parsed.host_str().unwrap_or("localhost").to_string(),
            port: parsed.port().unwrap_or(DEFAULT_MYSQL_PORT),
            user: decode_component(parsed.username())?,
            password: parsed.password().map(decode_component).transpose()?,
            database,
        })
    }
}

/// URL user info and path come back percent-encoded; the native tools need
/// the literal text.
fn decode_component(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| BackupError::Config(format!("Invalid encoding in database URL: {}", e)))
}

fn validate_product_name(name: &str) -> Result<()> {
    if name.trim().is_empty()
        || name.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
    {
        return Err(BackupError::Config(format!(
            "Invalid product_name '{}': only letters, digits, '_' and '-' are allowed",
            name
        )));
    }
    Ok(())
}

fn parse_settings_source(
    source: Option<&str>,
    settings_file: Option<PathBuf>,
    backup_dir: &Path,
) -> Result<SettingsSource> {
    match source.map(str::trim) {
        None | Some("") | Some("database") => Ok(SettingsSource::Database),
        Some("file") => Ok(SettingsSource::File(
            settings_file.unwrap_or_else(|| backup_dir.join("settings.json")),
        )),
        Some(other) => Err(BackupError::Config(format!(
            "settings_source must be 'database' or 'file', got '{}'",
            other
        ))),
    }
}
