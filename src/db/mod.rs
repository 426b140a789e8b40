//! The database seam used by the in-process dump and restore paths.

pub mod mysql;

use async_trait::async_trait;
use std::fmt;

use crate::errors::Result;

/// How a column's values are read back for the in-process dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Binary,
    Text,
}

impl ColumnKind {
    /// Classifies an `information_schema.COLUMNS.DATA_TYPE` value such as
    /// `int`, `varbinary` or `datetime`.
    pub fn from_data_type(data_type: &str) -> Self {
        let base = data_type
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match base.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "decimal"
            | "numeric" | "float" | "double" | "real" | "year" | "bool" | "boolean" => {
                ColumnKind::Numeric
            }
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit"
            | "geometry" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" => ColumnKind::Binary,
            _ => ColumnKind::Text,
        }
    }
}

/// A column that takes a value on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Column {
            name: name.into(),
            kind,
        }
    }
}

/// One column value as read from a table, ready to be written back as a
/// SQL literal. String data is never quoted here: the server hands it over
/// already quoted.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    /// Numeric value in the server's own textual form (`42`, `-3.50`, `1e-7`).
    Number(String),
    Bytes(Vec<u8>),
    /// A string literal exactly as produced by MySQL's `QUOTE()`.
    Quoted(String),
}

impl SqlValue {
    /// `None` unless `text` is a plain decimal number, optionally signed and
    /// with an exponent.
    pub fn number(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        is_numeric_literal(&text).then_some(SqlValue::Number(text))
    }

    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Number(n) => n.clone(),
            SqlValue::Bytes(b) => format!("X'{}'", hex::encode_upper(b)),
            SqlValue::Quoted(q) => q.clone(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

fn is_numeric_literal(text: &str) -> bool {
    fn digits(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_digit())
    }

    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
        None => (unsigned, None),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (whole.is_empty() && fraction.is_empty()) || !digits(whole) || !digits(fraction) {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && digits(exp)
        }
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementErrorKind {
    /// The server could not parse the statement (MySQL error 1064).
    Syntax,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementError {
    pub kind: StatementErrorKind,
    pub message: String,
}

impl StatementError {
    pub fn syntax(message: impl Into<String>) -> Self {
        StatementError {
            kind: StatementErrorKind::Syntax,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        StatementError {
            kind: StatementErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == StatementErrorKind::Syntax
    }
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives rows one at a time while a table is streamed.
pub trait RowSink {
    fn accept(&mut self, row: Vec<SqlValue>) -> Result<()>;
}

#[async_trait]
pub trait Database: Send {
    /// Base tables in name order.
    async fn table_names(&mut self) -> Result<Vec<String>>;

    /// The `CREATE TABLE` statement for `table`, without a terminator.
    async fn create_table_statement(&mut self, table: &str) -> Result<String>;

    /// Columns of `table` that accept a value on insert, in table order.
    /// Generated columns are left out.
    async fn insertable_columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Feeds `columns` of every row of `table` to `sink` in retrieval order
    /// and returns the row count.
    async fn stream_rows(
        &mut self,
        table: &str,
        columns: &[Column],
        sink: &mut (dyn RowSink + Send),
    ) -> Result<u64>;

    /// Runs a single statement on the session.
    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StatementError>;
}
