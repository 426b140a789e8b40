//! Schedule and retention settings, read once from the key/value store.

mod file;
mod sql;

pub use file::FileSettingsStore;
pub use sql::SqlSettingsStore;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

use crate::config::{AppConfig, SettingsSource};
use crate::errors::{BackupError, Result};

pub const KEY_BACKUP_FREQUENCY: &str = "backup_frequency";
pub const KEY_LAST_BACKUP_TIME: &str = "last_backup_time";
pub const KEY_RETENTION_COUNT: &str = "backup_retention_count";

pub const DEFAULT_RETENTION_COUNT: usize = 10;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupFrequency {
    #[default]
    Never,
    Daily,
    Weekly,
    Monthly,
}

impl BackupFrequency {
    /// Minimum time between scheduled backups. Months are a fixed 30 days.
    pub fn interval(&self) -> Option<chrono::Duration> {
        match self {
            BackupFrequency::Never => None,
            BackupFrequency::Daily => Some(chrono::Duration::hours(24)),
            BackupFrequency::Weekly => Some(chrono::Duration::days(7)),
            BackupFrequency::Monthly => Some(chrono::Duration::days(30)),
        }
    }
}

impl FromStr for BackupFrequency {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "never" => Ok(BackupFrequency::Never),
            "daily" => Ok(BackupFrequency::Daily),
            "weekly" => Ok(BackupFrequency::Weekly),
            "monthly" => Ok(BackupFrequency::Monthly),
            other => Err(BackupError::Config(format!(
                "Unknown backup_frequency '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BackupFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupFrequency::Never => "never",
            BackupFrequency::Daily => "daily",
            BackupFrequency::Weekly => "weekly",
            BackupFrequency::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait SettingsStore: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>>;
    async fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Opens the store named by `settings_source`.
pub async fn open_store(app_config: &AppConfig) -> Result<Box<dyn SettingsStore>> {
    match &app_config.settings_source {
        SettingsSource::Database => {
            let store = SqlSettingsStore::connect(&app_config.database).await?;
            Ok(Box::new(store))
        }
        SettingsSource::File(path) => Ok(Box::new(FileSettingsStore::new(path))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupSettings {
    pub frequency: BackupFrequency,
    /// `YYYY-MM-DD HH:MM:SS`, or empty when no backup was ever taken.
    pub last_backup_time: String,
    pub retention_count: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            frequency: BackupFrequency::Never,
            last_backup_time: String::new(),
            retention_count: DEFAULT_RETENTION_COUNT,
        }
    }
}

impl BackupSettings {
    /// Missing or malformed values fall back to their defaults.
    pub async fn load(store: &mut dyn SettingsStore) -> Result<Self> {
        let frequency = match store.get(KEY_BACKUP_FREQUENCY).await? {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}; treating as 'never'", e);
                BackupFrequency::Never
            }),
            None => BackupFrequency::Never,
        };

        let last_backup_time = store
            .get(KEY_LAST_BACKUP_TIME)
            .await?
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let retention_count = match store.get(KEY_RETENTION_COUNT).await? {
            Some(raw) => raw.trim().parse::<usize>().unwrap_or_else(|_| {
                tracing::warn!(
                    "Invalid backup_retention_count '{}'; using {}",
                    raw,
                    DEFAULT_RETENTION_COUNT
                );
                DEFAULT_RETENTION_COUNT
            }),
            None => DEFAULT_RETENTION_COUNT,
        };

        Ok(BackupSettings {
            frequency,
            last_backup_time,
            retention_count,
        })
    }
}

/// Accepts the stored format plus ISO-8601 variants.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Local).naive_local())
        })
}

/// Moves `last_backup_time` forward to `at`. An older `at` leaves the stored
/// value alone; returns whether the store was written.
pub async fn advance_last_backup_time(
    store: &mut dyn SettingsStore,
    at: NaiveDateTime,
) -> Result<bool> {
    if let Some(current) = store.get(KEY_LAST_BACKUP_TIME).await? {
        if let Some(current) = parse_timestamp(&current) {
            if current >= at {
                return Ok(false);
            }
        }
    }
    store
        .set(KEY_LAST_BACKUP_TIME, &at.format(TIMESTAMP_FORMAT).to_string())
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("Daily".parse::<BackupFrequency>().unwrap(), BackupFrequency::Daily);
        assert_eq!(" weekly ".parse::<BackupFrequency>().unwrap(), BackupFrequency::Weekly);
        assert_eq!("".parse::<BackupFrequency>().unwrap(), BackupFrequency::Never);
        assert!("hourly".parse::<BackupFrequency>().is_err());
        assert_eq!(BackupFrequency::Monthly.to_string(), "monthly");
        assert_eq!(
            BackupFrequency::Monthly.interval(),
            Some(chrono::Duration::days(30))
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2026-10-16 09:30:00"), Some(at(9, 30)));
        assert_eq!(parse_timestamp("2026-10-16T09:30:00"), Some(at(9, 30)));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[tokio::test]
    async fn test_load_applies_defaults_for_bad_values() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = FileSettingsStore::new(dir.path().join("settings.json"));

        let defaults = BackupSettings::load(&mut store).await?;
        assert_eq!(defaults, BackupSettings::default());

        store.set(KEY_BACKUP_FREQUENCY, "fortnightly").await?;
        store.set(KEY_RETENTION_COUNT, "lots").await?;
        store.set(KEY_LAST_BACKUP_TIME, " 2026-10-16 09:30:00 ").await?;
        let loaded = BackupSettings::load(&mut store).await?;
        assert_eq!(loaded.frequency, BackupFrequency::Never);
        assert_eq!(loaded.retention_count, DEFAULT_RETENTION_COUNT);
        assert_eq!(loaded.last_backup_time, "2026-10-16 09:30:00");
        Ok(())
    }

    #[tokio::test]
    async fn test_last_backup_time_only_moves_forward() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = FileSettingsStore::new(dir.path().join("settings.json"));

        assert!(advance_last_backup_time(&mut store, at(10, 0)).await?);
        assert!(!advance_last_backup_time(&mut store, at(9, 0)).await?);
        assert!(!advance_last_backup_time(&mut store, at(10, 0)).await?);
        assert_eq!(
            store.get(KEY_LAST_BACKUP_TIME).await?.as_deref(),
            Some("2026-10-16 10:00:00")
        );

        assert!(advance_last_backup_time(&mut store, at(11, 15)).await?);
        assert_eq!(
            store.get(KEY_LAST_BACKUP_TIME).await?.as_deref(),
            Some("2026-10-16 11:15:00")
        );
        Ok(())
    }
}
