// Connection checks run before any operation touches the database.
use crate::config::DatabaseConfig;
use crate::db::mysql::MySqlDatabase;
use crate::errors::Result;

/// `user@host:port/database`, safe to print.
pub fn connection_target(db: &DatabaseConfig) -> String {
    if db.user.is_empty() {
        format!("{}:{}/{}", db.host, db.port, db.database)
    } else {
        format!("{}@{}:{}/{}", db.user, db.host, db.port, db.database)
    }
}

/// Opens the application connection, reporting the outcome the way the
/// operator sees it.
pub async fn check_db_connection(db: &DatabaseConfig) -> Result<MySqlDatabase> {
    match MySqlDatabase::connect(db).await {
        Ok(conn) => {
            println!("✅ Successfully connected to {}", connection_target(db));
            Ok(conn)
        }
        Err(e) => {
            eprintln!("❌ Failed to connect to {}: {}", connection_target(db), e);
            Err(e)
        }
    }
}
