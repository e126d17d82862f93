//! SQLite target.
//!
//! Copies a SQLite database into another SQLite file using the source's own
//! types and defaults. Mostly useful for rehearsing a migration locally.

use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};

use crate::error::Result;
use crate::schema::{Dialect, TableMapping};
use crate::source;

use super::target::TargetStore;
use super::value::SqlValue;

/// SQLite target backend.
pub struct SqliteTarget {
    conn: Connection,
    path: PathBuf,
}

impl SqliteTarget {
    /// Open (or create) a SQLite database with foreign key enforcement on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path })
    }

    /// Path of the target database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TargetStore for SqliteTarget {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn insert_rows(&mut self, table: &TableMapping, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let sql = table.insert_sql(Dialect::Sqlite, 1);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut written = 0u64;
        for row in rows {
            written += stmt.execute(params_from_iter(row.iter()))? as u64;
        }
        Ok(written)
    }

    fn count_rows(&mut self, table: &str) -> Result<Option<u64>> {
        source::count_rows(&self.conn, table)
    }

    fn count_nulls(&mut self, table: &str, column: &str) -> Result<u64> {
        source::count_nulls(&self.conn, table, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnMapping, SchemaMapping};

    fn users() -> TableMapping {
        TableMapping::new("users")
            .with_column(ColumnMapping::new("id", "integer", "INTEGER").primary_key())
            .with_column(ColumnMapping::new("name", "text", "TEXT"))
    }

    #[test]
    fn test_insert_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = SqliteTarget::open(dir.path().join("t.sqlite3")).unwrap();
        let table = users();
        let mapping = SchemaMapping::new().with_table(table.clone());

        assert_eq!(target.count_rows("users").unwrap(), None);
        target
            .execute(&table.create_table_sql(&mapping, Dialect::Sqlite))
            .unwrap();

        let rows = vec![
            vec![SqlValue::Integer(1), SqlValue::Text("ada".into())],
            vec![SqlValue::Integer(7), SqlValue::Null],
        ];
        assert_eq!(target.insert_rows(&table, &rows).unwrap(), 2);
        assert_eq!(target.count_rows("users").unwrap(), Some(2));
        assert_eq!(target.count_nulls("users", "name").unwrap(), 1);
    }

    #[test]
    fn test_rollback_discards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sqlite3");
        let table = users();
        let mapping = SchemaMapping::new().with_table(table.clone());

        let mut target = SqliteTarget::open(&path).unwrap();
        target.begin().unwrap();
        target
            .execute(&table.create_table_sql(&mapping, Dialect::Sqlite))
            .unwrap();
        target
            .insert_rows(&table, &[vec![SqlValue::Integer(1), SqlValue::Null]])
            .unwrap();
        target.rollback().unwrap();
        // no-op outside a transaction
        target.rollback().unwrap();

        let mut reopened = SqliteTarget::open(&path).unwrap();
        assert_eq!(reopened.count_rows("users").unwrap(), None);
    }

    #[test]
    fn test_savepoints() {
        let dir = tempfile::tempdir().unwrap();
        let table = users();
        let mapping = SchemaMapping::new().with_table(table.clone());

        let mut target = SqliteTarget::open(dir.path().join("t.sqlite3")).unwrap();
        target.begin().unwrap();
        target
            .execute(&table.create_table_sql(&mapping, Dialect::Sqlite))
            .unwrap();
        target.savepoint("sp_0").unwrap();
        target
            .insert_rows(&table, &[vec![SqlValue::Integer(1), SqlValue::Null]])
            .unwrap();
        target.rollback_to_savepoint("sp_0").unwrap();
        target.release_savepoint("sp_0").unwrap();
        target.commit().unwrap();

        assert_eq!(target.count_rows("users").unwrap(), Some(0));
    }
}
