//! SQLite source database operations.

use crate::error::{MigrateError, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

/// Trait for source database operations. Read-only; no side effects.
pub trait SourceStore {
    /// Column names for a table in source-declared order, or `None` when the
    /// table does not exist (a skip, not a failure).
    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// The complete row set for a table, in whatever order the source
    /// naturally returns it.
    fn read_rows(&self, table: &str) -> Result<Vec<Vec<Value>>>;

    /// Row count for a table, or `None` when the table does not exist.
    fn row_count(&self, table: &str) -> Result<Option<i64>>;
}

/// SQLite source backed by a single read-only connection.
#[derive(Debug)]
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open the SQLite database file read-only. Failing here is fatal to the
    /// run: no table has been touched yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MigrateError::Config(format!(
                "SQLite database not found at {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        info!("Connected to SQLite: {}", path.display());
        Ok(Self { conn })
    }

    /// Wrap an existing connection (used by tests with in-memory databases).
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl SourceStore for SqliteSource {
    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        if columns.is_empty() {
            return Ok(None);
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(Some(columns))
    }

    fn read_rows(&self, table: &str) -> Result<Vec<Vec<Value>>> {
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let column_count = stmt.column_count();

        let rows = stmt
            .query_map([], |row| {
                (0..column_count)
                    .map(|idx| row.get::<_, Value>(idx))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<Vec<Value>>>>()?;

        debug!("Read {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    fn row_count(&self, table: &str) -> Result<Option<i64>> {
        if self.table_columns(table)?.is_none() {
            return Ok(None);
        }

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(Some(count))
    }
}

/// Quote a SQLite identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_source() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, is_active INTEGER);
            INSERT INTO users VALUES (1, 'ada', 1);
            INSERT INTO users VALUES (2, NULL, 0);
            "#,
        )
        .unwrap();
        SqliteSource::new(conn)
    }

    #[test]
    fn columns_in_declared_order() {
        let source = memory_source();
        let columns = source.table_columns("users").unwrap().unwrap();
        assert_eq!(columns, vec!["id", "name", "is_active"]);
    }

    #[test]
    fn missing_table_is_none_not_an_error() {
        let source = memory_source();
        assert!(source.table_columns("ghosts").unwrap().is_none());
        assert!(source.row_count("ghosts").unwrap().is_none());
    }

    #[test]
    fn reads_full_row_set_with_nulls() {
        let source = memory_source();
        let rows = source.read_rows("users").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Value::Text("ada".into()));
        assert_eq!(rows[1][1], Value::Null);
    }

    #[test]
    fn counts_rows() {
        let source = memory_source();
        assert_eq!(source.row_count("users").unwrap(), Some(2));
    }

    #[test]
    fn open_reads_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unified.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (42);")
            .unwrap();
        drop(conn);

        let source = SqliteSource::open(&path).unwrap();
        assert_eq!(source.row_count("t").unwrap(), Some(1));
    }

    #[test]
    fn open_rejects_missing_file() {
        let err = SqliteSource::open("/nonexistent/unified.db").unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }
}
