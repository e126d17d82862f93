//! Read-only access to the source SQLite database.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::error::{MigrationError, Result};
use crate::schema::quote_ident;

/// Open the source database read-only.
///
/// Fails with [`MigrationError::SourceNotFound`] before touching anything if
/// the file is missing; SQLite would otherwise happily create an empty one.
pub fn open_source(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(MigrationError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Names of every user table, sorted. SQLite's own `sqlite_*` tables are skipped.
pub fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND substr(name, 1, 7) != 'sqlite_' \
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Column names of a table in declaration order.
pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Row count of a table, or `None` if the table does not exist.
pub fn count_rows(conn: &Connection, table: &str) -> Result<Option<u64>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(None);
    }

    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(Some(count as u64))
}

/// Number of NULLs in one column.
pub fn count_nulls(conn: &Connection, table: &str, column: &str) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        quote_ident(table),
        quote_ident(column)
    );
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.sqlite3");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, bio TEXT);
             CREATE TABLE \"order\" (id INTEGER PRIMARY KEY);
             INSERT INTO users (name, bio) VALUES ('ada', NULL), ('grace', 'admiral');",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.sqlite3");
        let err = open_source(&path).unwrap_err();
        assert!(matches!(err, MigrationError::SourceNotFound { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_user_tables_skip_internal() {
        let (_dir, path) = fixture();
        let conn = open_source(&path).unwrap();
        // AUTOINCREMENT creates sqlite_sequence
        assert_eq!(user_tables(&conn).unwrap(), vec!["order", "users"]);
    }

    #[test]
    fn test_counts() {
        let (_dir, path) = fixture();
        let conn = open_source(&path).unwrap();
        assert_eq!(count_rows(&conn, "users").unwrap(), Some(2));
        assert_eq!(count_rows(&conn, "order").unwrap(), Some(0));
        assert_eq!(count_rows(&conn, "missing").unwrap(), None);
        assert_eq!(count_nulls(&conn, "users", "bio").unwrap(), 1);
        assert_eq!(column_names(&conn, "users").unwrap(), vec!["id", "name", "bio"]);
    }
}
