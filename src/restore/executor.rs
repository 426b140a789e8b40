// posbackup/src/restore/executor.rs
use crate::db::Database;
use crate::errors::{BackupError, Result};

use super::statements::ParsedScript;
use super::StatementCounts;

const DISABLE_FOREIGN_KEYS: &str = "SET FOREIGN_KEY_CHECKS=0";
const ENABLE_FOREIGN_KEYS: &str = "SET FOREIGN_KEY_CHECKS=1";

/// Replays `script` statement by statement over `db`.
///
/// Foreign key checks are off while the script runs and are switched back
/// on afterwards on every path, including a critical failure. A syntax
/// error aborts the replay; any other statement error is counted and the
/// replay continues.
pub async fn execute_script(db: &mut dyn Database, script: &ParsedScript) -> Result<StatementCounts> {
    db.execute(DISABLE_FOREIGN_KEYS)
        .await
        .map_err(|e| BackupError::StatementExecutionFailed(e.message))?;

    let replayed = run_statements(db, &script.statements).await;

    let reenabled = db.execute(ENABLE_FOREIGN_KEYS).await;
    if let Err(e) = &reenabled {
        tracing::error!("Failed to re-enable foreign key checks: {}", e);
    }

    let counts = replayed?;
    reenabled.map_err(|e| BackupError::StatementExecutionFailed(e.message))?;
    Ok(counts)
}

async fn run_statements(db: &mut dyn Database, statements: &[String]) -> Result<StatementCounts> {
    let mut counts = StatementCounts::default();

    for (index, statement) in statements.iter().enumerate() {
        match db.execute(statement).await {
            Ok(()) => counts.executed += 1,
            Err(e) if e.is_syntax() => {
                return Err(BackupError::CriticalRestoreFailure {
                    statement: index + 1,
                    message: e.message,
                });
            }
            Err(e) => {
                counts.failed += 1;
                tracing::warn!("Statement {} failed: {}", index + 1, e);
            }
        }
    }

    Ok(counts)
}
