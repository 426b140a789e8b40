// posbackup/src/backup/fallback.rs
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::db::{quote_identifier, Column, Database, RowSink, SqlValue};
use crate::errors::{BackupError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub tables: usize,
    pub rows: u64,
}

struct SqlWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

impl SqlWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| BackupError::write_failed(path, e))?;
        Ok(SqlWriter {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text).map_err(|e| BackupError::write_failed(&self.path, e))
    }

    fn finish(mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| BackupError::write_failed(&self.path, e))?;
        self.out
            .get_ref()
            .sync_all()
            .map_err(|e| BackupError::write_failed(&self.path, e))
    }
}

struct InsertWriter<'a> {
    writer: &'a mut SqlWriter,
    /// `INSERT INTO `t` (`a`, `b`) VALUES`
    prefix: String,
}

impl<'a> InsertWriter<'a> {
    fn new(writer: &'a mut SqlWriter, table: &str, columns: &[Column]) -> Self {
        let names: Vec<String> = columns.iter().map(|c| quote_identifier(&c.name)).collect();
        InsertWriter {
            writer,
            prefix: format!(
                "INSERT INTO {} ({}) VALUES",
                quote_identifier(table),
                names.join(", ")
            ),
        }
    }
}

impl RowSink for InsertWriter<'_> {
    fn accept(&mut self, row: Vec<SqlValue>) -> Result<()> {
        let values: Vec<String> = row.iter().map(SqlValue::to_sql_literal).collect();
        let statement = format!("{} ({});", self.prefix, values.join(", "));
        self.writer.line(&statement)
    }
}

/// Serialises every base table of `db` into a replayable SQL script at
/// `path`: a `DROP TABLE IF EXISTS` plus `CREATE TABLE` per table, followed
/// by one `INSERT` per row naming its insertable columns, all between
/// foreign-key check toggles.
pub async fn write_sql_dump(
    db: &mut dyn Database,
    path: &Path,
    product: &str,
    generated_on: NaiveDateTime,
) -> Result<DumpStats> {
    let mut writer = SqlWriter::create(path)?;

    writer.line(&format!("-- {} Database Backup", product))?;
    writer.line(&format!(
        "-- Generated on: {}",
        generated_on.format("%Y-%m-%d %H:%M:%S")
    ))?;
    writer.line("-- Strategy: in-process fallback")?;
    writer.line("-- ------------------------------------------------------")?;
    writer.line("")?;
    writer.line("SET FOREIGN_KEY_CHECKS=0;")?;

    let tables = db.table_names().await?;
    let mut stats = DumpStats::default();

    for table in &tables {
        let ident = quote_identifier(table);
        let create = db.create_table_statement(table).await?;

        writer.line("")?;
        writer.line(&format!("-- Table structure for table {}", ident))?;
        writer.line(&format!("DROP TABLE IF EXISTS {};", ident))?;
        writer.line(&format!("{};", create.trim_end().trim_end_matches(';')))?;
        writer.line("")?;
        writer.line(&format!("-- Dumping data for table {}", ident))?;

        let columns = db.insertable_columns(table).await?;
        let mut inserts = InsertWriter::new(&mut writer, table, &columns);
        let rows = db.stream_rows(table, &columns, &mut inserts).await?;
        tracing::debug!("Serialized {} rows from {}", rows, table);

        stats.tables += 1;
        stats.rows += rows;
    }

    writer.line("")?;
    writer.line("SET FOREIGN_KEY_CHECKS=1;")?;
    writer.finish()?;

    tracing::info!(
        "✓ In-process dump wrote {} tables / {} rows to {}",
        stats.tables,
        stats.rows,
        path.display()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::executor::execute_script;
    use crate::restore::statements::split_statements;
    use crate::testing::{num, MemoryDatabase};
    use chrono::NaiveDate;
    use std::fs;

    fn generated_on() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_script_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        let mut db = MemoryDatabase::sample_store();

        let stats = write_sql_dump(&mut db, &path, "POS", generated_on()).await?;
        assert_eq!(stats, DumpStats { tables: 3, rows: 6 });

        let script = fs::read_to_string(&path)?;
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "-- POS Database Backup");
        assert_eq!(lines[1], "-- Generated on: 2026-10-16 08:00:00");
        assert!(lines.contains(&"SET FOREIGN_KEY_CHECKS=0;"));
        assert_eq!(lines.last(), Some(&"SET FOREIGN_KEY_CHECKS=1;"));

        let drop_at = script.find("DROP TABLE IF EXISTS `products`;").unwrap();
        let create_at = script.find("CREATE TABLE `products`").unwrap();
        let insert_at = script.find("INSERT INTO `products` (").unwrap();
        assert!(drop_at < create_at && create_at < insert_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_values_are_null_aware_and_escaped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        let mut db = MemoryDatabase::sample_store();

        write_sql_dump(&mut db, &path, "POS", generated_on()).await?;
        let script = fs::read_to_string(&path)?;

        assert!(script.contains(
            r"INSERT INTO `products` (`id`, `name`, `description`, `price`, `discontinued_at`) VALUES (2, 'Kid\'s T-shirt', 'line one\nline two', 7.25, NULL);"
        ));
        assert!(script.contains(
            "INSERT INTO `product_images` (`id`, `product_id`, `thumbnail`) VALUES (1, 1, X'89504E47');"
        ));
        // Every INSERT stays on one line so the restore splitter sees it whole.
        assert!(script
            .lines()
            .filter(|l| l.starts_with("INSERT INTO"))
            .all(|l| l.ends_with(");")));
        Ok(())
    }

    #[tokio::test]
    async fn test_generated_columns_are_left_to_the_server() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        let mut db = MemoryDatabase::default();
        db.add_table(
            "sale_lines",
            "CREATE TABLE `sale_lines` (\n  `id` int NOT NULL,\n  `qty` int NOT NULL,\n  `unit_price` decimal(10,2) NOT NULL,\n  `line_total` decimal(12,2) GENERATED ALWAYS AS ((`qty` * `unit_price`)) STORED,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB",
            vec![vec![num("1"), num("3"), num("2.50")]],
        );

        write_sql_dump(&mut db, &path, "POS", generated_on()).await?;
        let script = fs::read_to_string(&path)?;
        assert!(script.contains(
            "INSERT INTO `sale_lines` (`id`, `qty`, `unit_price`) VALUES (1, 3, 2.50);"
        ));

        let mut target = MemoryDatabase::default();
        let counts = execute_script(&mut target, &split_statements(&script)).await?;
        assert_eq!(counts.failed, 0);
        assert_eq!(target.tables["sale_lines"].rows, db.tables["sale_lines"].rows);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_database_still_produces_a_valid_script() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        let mut db = MemoryDatabase::default();

        let stats = write_sql_dump(&mut db, &path, "POS", generated_on()).await?;
        assert_eq!(stats, DumpStats::default());
        let script = fs::read_to_string(&path)?;
        assert!(script.contains("SET FOREIGN_KEY_CHECKS=0;"));
        assert!(script.trim_end().ends_with("SET FOREIGN_KEY_CHECKS=1;"));
        Ok(())
    }
}
