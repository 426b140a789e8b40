use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::SettingsStore;
use crate::errors::{BackupError, Result};

/// Settings kept as a flat JSON object of string values, for installs where
/// the application database has no `settings` table.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSettingsStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| BackupError::read_failed(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            BackupError::Config(format!(
                "Settings file {} is not a JSON object of strings: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BackupError::write_failed(parent, e))?;
            }
        }
        let body = serde_json::to_string_pretty(values)
            .map_err(|e| BackupError::Config(format!("Failed to serialize settings: {}", e)))?;

        // Write-then-rename so a reader never sees a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| BackupError::write_failed(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| BackupError::write_failed(&self.path, e))
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("settings.json");

        let mut store = FileSettingsStore::new(&path);
        assert_eq!(store.get("backup_frequency").await?, None);
        store.set("backup_frequency", "weekly").await?;
        store.set("backup_retention_count", "5").await?;

        let mut reopened = FileSettingsStore::new(&path);
        assert_eq!(
            reopened.get("backup_frequency").await?.as_deref(),
            Some("weekly")
        );
        assert_eq!(
            reopened.get("backup_retention_count").await?.as_deref(),
            Some("5")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_config_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2, 3]")?;

        let mut store = FileSettingsStore::new(&path);
        assert!(matches!(
            store.get("backup_frequency").await,
            Err(BackupError::Config(_))
        ));
        Ok(())
    }
}
