use async_trait::async_trait;
use sqlx::mysql::MySqlConnection;
use sqlx::Connection;

use super::SettingsStore;
use crate::config::DatabaseConfig;
use crate::errors::Result;

/// The application's generic `settings(setting_key, setting_value)` table.
pub struct SqlSettingsStore {
    conn: MySqlConnection,
}

impl SqlSettingsStore {
    pub async fn connect(db: &DatabaseConfig) -> Result<Self> {
        let conn = MySqlConnection::connect(&db.url).await?;
        Ok(SqlSettingsStore { conn })
    }
}

#[async_trait]
impl SettingsStore for SqlSettingsStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT setting_value FROM settings WHERE setting_key = ?")
                .bind(key)
                .fetch_optional(&mut self.conn)
                .await?;
        Ok(value.flatten())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (setting_key, setting_value) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE setting_value = VALUES(setting_value)",
        )
        .bind(key)
        .bind(value)
        .execute(&mut self.conn)
        .await?;
        Ok(())
    }
}
