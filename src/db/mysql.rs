// posbackup/src/db/mysql.rs
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Connection, Row};

use super::{quote_identifier, Column, ColumnKind, Database, RowSink, SqlValue, StatementError};
use crate::config::DatabaseConfig;
use crate::errors::{BackupError, Result};

/// MySQL's "You have an error in your SQL syntax" error number.
const ER_PARSE_ERROR: u16 = 1064;

/// `DEFAULT_GENERATED` in `EXTRA` marks an expression default, which still
/// takes a value on insert.
const INSERTABLE_COLUMNS: &str = "SELECT COLUMN_NAME, DATA_TYPE FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     AND EXTRA NOT LIKE '%VIRTUAL GENERATED%' \
     AND EXTRA NOT LIKE '%STORED GENERATED%' \
     AND EXTRA NOT LIKE '%PERSISTENT GENERATED%' \
     ORDER BY ORDINAL_POSITION";

/// A single live session. The in-process restore toggles
/// `FOREIGN_KEY_CHECKS`, which is per-session, so this wraps a
/// connection rather than a pool.
pub struct MySqlDatabase {
    conn: MySqlConnection,
}

impl MySqlDatabase {
    pub async fn connect(db: &DatabaseConfig) -> Result<Self> {
        tracing::debug!("Connecting to {}:{}/{}", db.host, db.port, db.database);
        let conn = MySqlConnection::connect(&db.url).await?;
        Ok(MySqlDatabase { conn })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn table_names(&mut self) -> Result<Vec<String>> {
        // Plain-text queries go over the text protocol, so every column
        // arrives in its textual form.
        let rows = sqlx::Executor::fetch_all(
            &mut self.conn,
            "SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'",
        )
        .await?;

        let mut names = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    async fn create_table_statement(&mut self, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", quote_identifier(table));
        let row = sqlx::Executor::fetch_one(&mut self.conn, sql.as_str()).await?;
        let statement: String = row.try_get(1)?;
        Ok(statement)
    }

    async fn insertable_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let rows = sqlx::query(INSERTABLE_COLUMNS)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;

        rows.iter()
            .map(|row| -> Result<Column> {
                let name: String = row.try_get_unchecked(0)?;
                let data_type: String = row.try_get_unchecked(1)?;
                Ok(Column::new(name, ColumnKind::from_data_type(&data_type)))
            })
            .collect()
    }

    async fn stream_rows(
        &mut self,
        table: &str,
        columns: &[Column],
        sink: &mut (dyn RowSink + Send),
    ) -> Result<u64> {
        if columns.is_empty() {
            return Ok(0);
        }
        let sql = rendered_select(table, columns);
        let mut rows = sqlx::Executor::fetch(&mut self.conn, sql.as_str());

        let mut count = 0u64;
        while let Some(row) = rows.try_next().await? {
            sink.accept(decode_row(&row, columns)?)?;
            count += 1;
        }
        Ok(count)
    }

    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StatementError> {
        sqlx::Executor::execute(&mut self.conn, statement)
            .await
            .map(|_| ())
            .map_err(classify_error)
    }
}

/// Selects `columns` with each value already in literal form: the server
/// quotes text with `QUOTE()` and hex-encodes binary data, and numbers come
/// back as the server prints them. Line breaks inside quoted text are
/// escaped so every row stays on one line of the dump.
fn rendered_select(table: &str, columns: &[Column]) -> String {
    let expressions: Vec<String> = columns
        .iter()
        .map(|column| {
            let ident = quote_identifier(&column.name);
            match column.kind {
                ColumnKind::Numeric => ident,
                ColumnKind::Binary => format!("HEX({})", ident),
                ColumnKind::Text => format!(
                    "REPLACE(REPLACE(QUOTE({}), CHAR(10 USING utf8mb4), CONCAT(CHAR(92 USING utf8mb4), 'n')), \
                     CHAR(13 USING utf8mb4), CONCAT(CHAR(92 USING utf8mb4), 'r'))",
                    ident
                ),
            }
        })
        .collect();
    format!(
        "SELECT {} FROM {}",
        expressions.join(", "),
        quote_identifier(table)
    )
}

fn decode_row(row: &MySqlRow, columns: &[Column]) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let text: Option<String> = row.try_get_unchecked(index)?;
        let value = match (column.kind, text) {
            (_, None) => SqlValue::Null,
            (ColumnKind::Numeric, Some(text)) => SqlValue::number(text.as_str()).ok_or_else(|| {
                BackupError::StatementExecutionFailed(format!(
                    "Unexpected value '{}' in numeric column {}",
                    text, column.name
                ))
            })?,
            (ColumnKind::Binary, Some(digits)) => SqlValue::Bytes(decode_hex(&digits)?),
            // QUOTE(NULL) is the bare word NULL.
            (ColumnKind::Text, Some(quoted)) if quoted == "NULL" => SqlValue::Null,
            (ColumnKind::Text, Some(quoted)) => SqlValue::Quoted(quoted),
        };
        values.push(value);
    }
    Ok(values)
}

/// `HEX()` of a BIT value can have an odd number of digits.
fn decode_hex(digits: &str) -> Result<Vec<u8>> {
    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    hex::decode(&padded).map_err(|e| {
        BackupError::StatementExecutionFailed(format!("Server returned invalid hex data: {}", e))
    })
}

fn classify_error(err: sqlx::Error) -> StatementError {
    let is_syntax = match &err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map_or(false, |e| e.number() == ER_PARSE_ERROR),
        _ => false,
    };

    if is_syntax {
        StatementError::syntax(err.to_string())
    } else {
        StatementError::other(err.to_string())
    }
}
