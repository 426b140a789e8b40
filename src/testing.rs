//! Fixtures shared by the unit tests: a scripted stand-in for the native
//! MySQL tools and an in-memory `Database`.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::db::{Column, ColumnKind, Database, RowSink, SqlValue, StatementError};
use crate::errors::{BackupError, Result};

/// Writes an executable `/bin/sh` script that answers `--version` with
/// `version_line` and otherwise runs `body`.
#[cfg(unix)]
pub fn write_fake_tool(
    dir: &std::path::Path,
    name: &str,
    version_line: &str,
    body: &str,
) -> std::io::Result<std::path::PathBuf> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then\n  echo \"{}\"\n  exit 0\nfi\n{}\n",
        version_line, body
    );
    {
        let mut file = std::fs::File::create(&path)?;
        file.write_all(script.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// A numeric value as the server prints it.
pub fn num(digits: &str) -> SqlValue {
    SqlValue::Number(digits.to_string())
}

/// A string value quoted the way `MySqlDatabase` receives it: `QUOTE()`
/// escaping plus escaped line breaks.
pub fn text(value: &str) -> SqlValue {
    let mut quoted = String::from("'");
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\0' => quoted.push_str("\\0"),
            '\u{1a}' => quoted.push_str("\\Z"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    SqlValue::Quoted(quoted)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    pub create: String,
    /// Insertable columns in table order; `rows` follow this layout.
    pub columns: Vec<Column>,
    pub generated: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Understands just enough SQL to replay the scripts this crate writes:
/// `SET FOREIGN_KEY_CHECKS`, `DROP TABLE IF EXISTS`, `CREATE TABLE` and
/// single- or multi-row `INSERT ... VALUES` with or without a column list.
/// Anything else succeeds as a no-op.
#[derive(Debug)]
pub struct MemoryDatabase {
    pub tables: BTreeMap<String, MemoryTable>,
    pub executed: Vec<String>,
    pub foreign_key_checks: bool,
    failures: Vec<(String, StatementError)>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        MemoryDatabase {
            tables: BTreeMap::new(),
            executed: Vec::new(),
            foreign_key_checks: true,
            failures: Vec::new(),
        }
    }
}

impl MemoryDatabase {
    /// Three related tables holding six rows between them, with values that
    /// need escaping, a NULL and a binary column.
    pub fn sample_store() -> Self {
        let mut db = MemoryDatabase::default();
        db.add_table(
            "categories",
            "CREATE TABLE `categories` (\n  `id` int NOT NULL,\n  `name` varchar(64) NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB",
            vec![
                vec![num("1"), text("Apparel")],
                vec![num("2"), text("Toys & Games")],
            ],
        );
        db.add_table(
            "products",
            "CREATE TABLE `products` (\n  `id` int NOT NULL,\n  `name` varchar(128) NOT NULL,\n  `description` text,\n  `price` decimal(10,2) NOT NULL,\n  `discontinued_at` datetime DEFAULT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB",
            vec![
                vec![
                    num("1"),
                    text("Classic Hoodie"),
                    text("Cotton; 80/20 \"blend\""),
                    num("39.90"),
                    text("2026-01-31 18:00:00"),
                ],
                vec![
                    num("2"),
                    text("Kid's T-shirt"),
                    text("line one\nline two"),
                    num("7.25"),
                    SqlValue::Null,
                ],
            ],
        );
        db.add_table(
            "product_images",
            "CREATE TABLE `product_images` (\n  `id` int NOT NULL,\n  `product_id` int NOT NULL,\n  `thumbnail` blob,\n  PRIMARY KEY (`id`),\n  CONSTRAINT `fk_image_product` FOREIGN KEY (`product_id`) REFERENCES `products` (`id`)\n) ENGINE=InnoDB",
            vec![
                vec![num("1"), num("1"), SqlValue::Bytes(vec![0x89, 0x50, 0x4E, 0x47])],
                vec![num("2"), num("2"), SqlValue::Bytes(vec![0x00, b'\'', b';', 0xFF])],
            ],
        );
        db
    }

    /// Registers a table; its columns are read from `create`.
    pub fn add_table(&mut self, name: &str, create: &str, rows: Vec<Vec<SqlValue>>) {
        let (columns, generated) = parse_columns(create);
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                create: create.to_string(),
                columns,
                generated,
                rows,
            },
        );
    }

    /// Every statement containing `needle` fails with `error`.
    pub fn fail_on(mut self, needle: &str, error: StatementError) -> Self {
        self.failures.push((needle.to_string(), error));
        self
    }

    fn apply(&mut self, statement: &str) -> std::result::Result<(), StatementError> {
        let upper = statement.to_ascii_uppercase();
        let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();

        if compact.starts_with("SETFOREIGN_KEY_CHECKS=") {
            self.foreign_key_checks = !compact.starts_with("SETFOREIGN_KEY_CHECKS=0");
            return Ok(());
        }
        if upper.starts_with("DROP TABLE IF EXISTS") {
            let (name, _) = parse_identifier(&statement["DROP TABLE IF EXISTS".len()..])?;
            self.tables.remove(&name);
            return Ok(());
        }
        if upper.starts_with("CREATE TABLE") {
            let (name, _) = parse_identifier(&statement["CREATE TABLE".len()..])?;
            self.add_table(&name, statement, Vec::new());
            return Ok(());
        }
        if upper.starts_with("INSERT INTO") {
            let (name, rest) = parse_identifier(&statement["INSERT INTO".len()..])?;
            let (named, rest) = parse_column_list(rest)?;
            if !rest.to_ascii_uppercase().starts_with("VALUES") {
                return Err(syntax_error(rest));
            }
            let tuples = parse_tuples(&rest["VALUES".len()..])?;
            let table = self.tables.get_mut(&name).ok_or_else(|| {
                StatementError::other(format!("Table '{}' doesn't exist", name))
            })?;
            let rows = arrange_rows(&name, table, named, tuples)?;
            table.rows.extend(rows);
            return Ok(());
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn table_names(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn create_table_statement(&mut self, table: &str) -> Result<String> {
        self.table(table).map(|t| t.create.clone())
    }

    async fn insertable_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        self.table(table).map(|t| t.columns.clone())
    }

    async fn stream_rows(
        &mut self,
        table: &str,
        columns: &[Column],
        sink: &mut (dyn RowSink + Send),
    ) -> Result<u64> {
        let table = self.table(table)?.clone();
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| table.columns.iter().position(|t| t.name == c.name))
            .collect();

        for row in &table.rows {
            let projected = positions
                .iter()
                .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or(SqlValue::Null))
                .collect();
            sink.accept(projected)?;
        }
        Ok(table.rows.len() as u64)
    }

    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StatementError> {
        let statement = statement.trim().trim_end_matches(';').trim_end();
        self.executed.push(statement.to_string());

        if let Some((_, error)) = self
            .failures
            .iter()
            .find(|(needle, _)| statement.contains(needle.as_str()))
        {
            return Err(error.clone());
        }
        self.apply(statement)
    }
}

impl MemoryDatabase {
    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables.get(name).ok_or_else(|| {
            BackupError::StatementExecutionFailed(format!("Table '{}' doesn't exist", name))
        })
    }
}

fn syntax_error(near: &str) -> StatementError {
    let near: String = near.chars().take(40).collect();
    StatementError::syntax(format!(
        "You have an error in your SQL syntax; check the manual near '{}'",
        near
    ))
}

/// Column definitions of a `CREATE TABLE` body: the insertable columns and
/// the names of generated ones.
fn parse_columns(create: &str) -> (Vec<Column>, Vec<String>) {
    let mut columns = Vec::new();
    let mut generated = Vec::new();
    let (Some(open), Some(close)) = (create.find('('), create.rfind(')')) else {
        return (columns, generated);
    };

    for definition in split_top_level(&create[open + 1..close]) {
        let definition = definition.trim();
        if !definition.starts_with('`') {
            continue;
        }
        let Ok((name, rest)) = parse_identifier(definition) else {
            continue;
        };
        let upper = rest.to_ascii_uppercase();
        if upper.contains("GENERATED ALWAYS") || upper.contains(" AS (") {
            generated.push(name);
            continue;
        }
        let data_type: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        columns.push(Column::new(name, ColumnKind::from_data_type(&data_type)));
    }
    (columns, generated)
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn parse_identifier(input: &str) -> std::result::Result<(String, &str), StatementError> {
    let input = input.trim_start();
    if let Some(quoted) = input.strip_prefix('`') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '`' {
                if matches!(chars.peek(), Some((_, '`'))) {
                    chars.next();
                    name.push('`');
                    continue;
                }
                return Ok((name, &quoted[i + 1..]));
            }
            name.push(c);
        }
        return Err(syntax_error(input));
    }

    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(input.len());
    if end == 0 {
        return Err(syntax_error(input));
    }
    Ok((input[..end].to_string(), &input[end..]))
}

/// An optional `(`a`, `b`)` list after the table name of an INSERT.
fn parse_column_list(input: &str) -> std::result::Result<(Option<Vec<String>>, &str), StatementError> {
    let Some(mut rest) = input.trim_start().strip_prefix('(') else {
        return Ok((None, input.trim_start()));
    };
    let mut names = Vec::new();
    loop {
        let (name, after) = parse_identifier(rest)?;
        names.push(name);
        let after = after.trim_start();
        if let Some(after) = after.strip_prefix(',') {
            rest = after;
        } else if let Some(after) = after.strip_prefix(')') {
            return Ok((Some(names), after.trim_start()));
        } else {
            return Err(syntax_error(after));
        }
    }
}

/// Lays inserted tuples out in the table's column order, rejecting values
/// for generated columns the way MySQL does.
fn arrange_rows(
    table_name: &str,
    table: &MemoryTable,
    named: Option<Vec<String>>,
    tuples: Vec<Vec<SqlValue>>,
) -> std::result::Result<Vec<Vec<SqlValue>>, StatementError> {
    let count_mismatch = || StatementError::other("Column count doesn't match value count at row 1");

    let Some(named) = named else {
        if !table.generated.is_empty() {
            return Err(StatementError::other(format!(
                "The value specified for generated column '{}' in table '{}' is not allowed.",
                table.generated[0], table_name
            )));
        }
        if tuples.iter().any(|t| t.len() != table.columns.len()) {
            return Err(count_mismatch());
        }
        return Ok(tuples);
    };

    let mut positions = Vec::with_capacity(named.len());
    for name in &named {
        if table.generated.contains(name) {
            return Err(StatementError::other(format!(
                "The value specified for generated column '{}' in table '{}' is not allowed.",
                name, table_name
            )));
        }
        let position = table
            .columns
            .iter()
            .position(|c| &c.name == name)
            .ok_or_else(|| StatementError::other(format!("Unknown column '{}' in 'field list'", name)))?;
        positions.push(position);
    }

    tuples
        .into_iter()
        .map(|tuple| {
            if tuple.len() != positions.len() {
                return Err(count_mismatch());
            }
            let mut row = vec![SqlValue::Null; table.columns.len()];
            for (value, &position) in tuple.into_iter().zip(&positions) {
                row[position] = value;
            }
            Ok(row)
        })
        .collect()
}

fn parse_tuples(input: &str) -> std::result::Result<Vec<Vec<SqlValue>>, StatementError> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut rows = Vec::new();

    loop {
        skip_whitespace(&chars, &mut pos);
        if chars.get(pos) != Some(&'(') {
            return Err(syntax_error(&chars[pos.min(chars.len())..].iter().collect::<String>()));
        }
        pos += 1;

        let mut row = Vec::new();
        loop {
            skip_whitespace(&chars, &mut pos);
            row.push(parse_value(&chars, &mut pos)?);
            skip_whitespace(&chars, &mut pos);
            match chars.get(pos) {
                Some(',') => pos += 1,
                Some(')') => {
                    pos += 1;
                    break;
                }
                _ => return Err(syntax_error("")),
            }
        }
        rows.push(row);

        skip_whitespace(&chars, &mut pos);
        match chars.get(pos) {
            Some(',') => pos += 1,
            None => return Ok(rows),
            Some(_) => return Err(syntax_error(&chars[pos..].iter().collect::<String>())),
        }
    }
}

fn skip_whitespace(chars: &[char], pos: &mut usize) {
    while chars.get(*pos).is_some_and(|c| c.is_whitespace()) {
        *pos += 1;
    }
}

fn parse_value(chars: &[char], pos: &mut usize) -> std::result::Result<SqlValue, StatementError> {
    match chars.get(*pos) {
        Some('\'') => parse_quoted(chars, pos).map(SqlValue::Quoted),
        Some('X') | Some('x') if chars.get(*pos + 1) == Some(&'\'') => {
            *pos += 2;
            let start = *pos;
            while chars.get(*pos).is_some_and(|c| *c != '\'') {
                *pos += 1;
            }
            if chars.get(*pos).is_none() {
                return Err(syntax_error("X'"));
            }
            let digits: String = chars[start..*pos].iter().collect();
            *pos += 1;
            hex::decode(&digits)
                .map(SqlValue::Bytes)
                .map_err(|_| syntax_error(&digits))
        }
        Some(_) => {
            let start = *pos;
            while chars
                .get(*pos)
                .is_some_and(|c| !matches!(c, ',' | ')') && !c.is_whitespace())
            {
                *pos += 1;
            }
            let token: String = chars[start..*pos].iter().collect();
            if token.eq_ignore_ascii_case("NULL") {
                Ok(SqlValue::Null)
            } else {
                SqlValue::number(token.as_str()).ok_or_else(|| syntax_error(&token))
            }
        }
        None => Err(syntax_error("")),
    }
}

/// Returns the literal verbatim, quotes included.
fn parse_quoted(chars: &[char], pos: &mut usize) -> std::result::Result<String, StatementError> {
    let start = *pos;
    *pos += 1;
    loop {
        match chars.get(*pos) {
            None => return Err(syntax_error(&chars[start..].iter().collect::<String>())),
            Some('\\') => {
                if chars.get(*pos + 1).is_none() {
                    return Err(syntax_error(&chars[start..].iter().collect::<String>()));
                }
                *pos += 2;
            }
            Some('\'') if chars.get(*pos + 1) == Some(&'\'') => *pos += 2,
            Some('\'') => {
                *pos += 1;
                return Ok(chars[start..*pos].iter().collect());
            }
            Some(_) => *pos += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_replays_inserts() -> anyhow::Result<()> {
        let mut db = MemoryDatabase::default();
        db.execute("SET FOREIGN_KEY_CHECKS = 0;").await.unwrap();
        assert!(!db.foreign_key_checks);
        db.execute("CREATE TABLE `t` (`a` int, `b` text, `c` blob)")
            .await
            .unwrap();
        db.execute(r"INSERT INTO `t` VALUES (1, 'it\'s', X'00FF'), (-2.5, NULL, X'')")
            .await
            .unwrap();
        db.execute("INSERT INTO `t` (`c`, `a`) VALUES (X'01', 3)")
            .await
            .unwrap();

        assert_eq!(
            db.tables["t"].rows,
            vec![
                vec![num("1"), text("it's"), SqlValue::Bytes(vec![0x00, 0xFF])],
                vec![num("-2.5"), SqlValue::Null, SqlValue::Bytes(vec![])],
                vec![num("3"), SqlValue::Null, SqlValue::Bytes(vec![0x01])],
            ]
        );

        let truncated = db.execute("INSERT INTO `t` VALUES (3, 'unterminated").await;
        assert!(truncated.is_err_and(|e| e.is_syntax()));
        let missing = db.execute("INSERT INTO `nope` VALUES (1)").await;
        assert!(missing.is_err_and(|e| !e.is_syntax()));
        Ok(())
    }

    #[tokio::test]
    async fn test_generated_columns_reject_values() -> anyhow::Result<()> {
        let mut db = MemoryDatabase::default();
        db.execute(
            "CREATE TABLE `lines` (`qty` int, `price` decimal(10,2), `total` decimal(12,2) GENERATED ALWAYS AS ((`qty` * `price`)) STORED)",
        )
        .await
        .unwrap();
        assert_eq!(
            db.tables["lines"].columns,
            vec![
                Column::new("qty", ColumnKind::Numeric),
                Column::new("price", ColumnKind::Numeric),
            ]
        );
        assert_eq!(db.tables["lines"].generated, vec!["total"]);

        let positional = db.execute("INSERT INTO `lines` VALUES (2, 1.50, 3.00)").await;
        assert!(positional.is_err_and(|e| !e.is_syntax()));
        let named = db
            .execute("INSERT INTO `lines` (`qty`, `price`, `total`) VALUES (2, 1.50, 3.00)")
            .await;
        assert!(named.is_err_and(|e| e.message.contains("generated column 'total'")));
        db.execute("INSERT INTO `lines` (`qty`, `price`) VALUES (2, 1.50)")
            .await
            .unwrap();
        assert_eq!(db.tables["lines"].rows, vec![vec![num("2"), num("1.50")]]);
        Ok(())
    }
}
