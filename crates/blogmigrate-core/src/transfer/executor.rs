//! Table-by-table copy inside a single target transaction.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::error::{MigrationError, Result};
use crate::schema::{SchemaMapping, TableMapping};
use crate::source::{self, open_source};

use super::result::{TableFailure, TransferResult};
use super::target::TargetStore;
use super::value::SqlValue;

/// Default number of rows read from the source per insert batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Transfer options.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Count rows only; the target is not touched.
    pub dry_run: bool,
    /// Return the first failure as an error instead of recording it and
    /// carrying on with the remaining tables.
    pub raise_on_error: bool,
    /// Rows per insert batch.
    pub batch_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            raise_on_error: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl TransferOptions {
    /// Set dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set whether the first failure is returned as an error.
    pub fn with_raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }

    /// Set the insert batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Copy every table in `mapping` from the source database into `target`.
///
/// All tables are written in one transaction, parents before children, with
/// primary key values preserved. Indexes and (for PostgreSQL) foreign keys
/// are added once all data is in place.
///
/// Either every table commits or none does. With `raise_on_error` the first
/// failure rolls back and is returned as [`MigrationError::Transfer`].
/// Otherwise each failed table is recorded in [`TransferResult::failures`],
/// the remaining tables are still attempted so all problems surface in one
/// run, and the transaction is rolled back at the end.
pub fn transfer_data(
    source_path: impl AsRef<Path>,
    mapping: &SchemaMapping,
    target: &mut dyn TargetStore,
    options: &TransferOptions,
) -> Result<TransferResult> {
    let source = open_source(source_path.as_ref())?;
    let order = mapping.dependency_order();

    if options.dry_run {
        return count_only(&source, &order);
    }

    info!(
        target = %target.describe(),
        tables = order.len(),
        batch_size = options.batch_size,
        "starting data transfer"
    );
    target.begin()?;

    let mut table_counts = BTreeMap::new();
    let mut failures = Vec::new();

    for (position, name) in order.iter().enumerate() {
        let Some(table) = mapping.table(name) else {
            continue;
        };

        let copied = within_savepoint(target, &format!("copy_{}", position), |target| {
            copy_table(&source, mapping, table, target, options.batch_size)
        });

        match copied {
            Ok(rows) => {
                info!(table = %name, rows, "table transferred");
                table_counts.insert(name.clone(), rows);
            }
            Err(err) => {
                let failure = TableFailure::from_error(name.as_str(), &err);
                error!(table = %name, kind = %failure.kind, error = %err, "table transfer failed");
                if options.raise_on_error {
                    abort(target);
                    return Err(failure.into_error());
                }
                failures.push(failure);
            }
        }
    }

    if failures.is_empty() {
        for (position, name) in order.iter().enumerate() {
            let Some(table) = mapping.table(name) else {
                continue;
            };

            let finished = within_savepoint(target, &format!("finish_{}", position), |target| {
                finish_table(mapping, table, target)
            });

            if let Err(err) = finished {
                let failure = TableFailure::from_error(name.as_str(), &err);
                error!(table = %name, kind = %failure.kind, error = %err, "finalizing table failed");
                if options.raise_on_error {
                    abort(target);
                    return Err(failure.into_error());
                }
                failures.push(failure);
            }
        }
    }

    if !failures.is_empty() {
        abort(target);
        warn!(
            failed = failures.len(),
            "transfer rolled back; no rows were written to the target"
        );
        return Ok(TransferResult {
            table_counts,
            failures,
            dry_run: false,
            committed: false,
        });
    }

    if let Err(err) = target.commit() {
        let kind = err.failure_kind();
        error!(kind = %kind, error = %err, "commit failed");
        abort(target);
        return Err(MigrationError::Commit {
            kind,
            message: err.to_string(),
        });
    }

    let result = TransferResult {
        table_counts,
        failures,
        dry_run: false,
        committed: true,
    };
    info!(
        tables = result.table_counts.len(),
        rows = result.total_rows(),
        "data transfer committed"
    );
    Ok(result)
}

fn count_only(source: &Connection, order: &[String]) -> Result<TransferResult> {
    let mut table_counts = BTreeMap::new();
    for name in order {
        let rows = source::count_rows(source, name)?.unwrap_or(0);
        info!(table = %name, rows, "dry run: rows counted");
        table_counts.insert(name.clone(), rows);
    }

    let result = TransferResult {
        table_counts,
        failures: Vec::new(),
        dry_run: true,
        committed: false,
    };
    info!(
        tables = result.table_counts.len(),
        rows = result.total_rows(),
        "dry run complete; target untouched"
    );
    Ok(result)
}

/// Run `step` inside a savepoint, rolling back to it on failure so the
/// outer transaction stays usable.
fn within_savepoint<T>(
    target: &mut dyn TargetStore,
    name: &str,
    step: impl FnOnce(&mut dyn TargetStore) -> Result<T>,
) -> Result<T> {
    target.savepoint(name)?;
    match step(&mut *target) {
        Ok(value) => {
            target.release_savepoint(name)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(undo) = target
                .rollback_to_savepoint(name)
                .and_then(|()| target.release_savepoint(name))
            {
                warn!(savepoint = name, error = %undo, "could not roll back to savepoint");
            }
            Err(err)
        }
    }
}

fn copy_table(
    source: &Connection,
    mapping: &SchemaMapping,
    table: &TableMapping,
    target: &mut dyn TargetStore,
    batch_size: usize,
) -> Result<u64> {
    target.execute(&table.create_table_sql(mapping, target.dialect()))?;

    if let Some(rows) = target.count_rows(&table.name)? {
        if rows > 0 {
            return Err(MigrationError::TargetNotEmpty {
                table: table.name.clone(),
                rows,
            });
        }
    }

    let width = table.columns.len();
    let batch_size = batch_size.max(1);
    let mut stmt = source.prepare(&table.select_sql())?;
    let mut rows = stmt.query([])?;
    let mut batch: Vec<Vec<SqlValue>> = Vec::with_capacity(batch_size);
    let mut copied = 0u64;

    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get_ref(i).map(SqlValue::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        batch.push(values);

        if batch.len() >= batch_size {
            copied += target.insert_rows(table, &batch)?;
            batch.clear();
            debug!(table = %table.name, copied, "batch copied");
        }
    }
    if !batch.is_empty() {
        copied += target.insert_rows(table, &batch)?;
    }

    Ok(copied)
}

fn finish_table(
    mapping: &SchemaMapping,
    table: &TableMapping,
    target: &mut dyn TargetStore,
) -> Result<()> {
    for statement in table.post_load_sql(mapping, target.dialect()) {
        target.execute(&statement)?;
    }
    target.finish_table(table)
}

fn abort(target: &mut dyn TargetStore) {
    if let Err(err) = target.rollback() {
        error!(error = %err, "rolling back the target transaction failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferFailureKind;
    use crate::schema::convert_schema;
    use crate::transfer::SqliteTarget;
    use std::path::PathBuf;

    const SCHEMA: &str = "
        CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(120) NOT NULL UNIQUE);
        CREATE TABLE posts (
            id INTEGER PRIMARY KEY,
            author_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            body BLOB
        );
        CREATE INDEX idx_posts_author ON posts(author_id);
        INSERT INTO users VALUES (1, 'a@example.com'), (5, 'b@example.com');
        INSERT INTO posts VALUES (10, 1, 'first', X'00FF'), (11, 5, 'second', NULL),
                                 (12, 5, 'third', NULL);
    ";

    fn fixture(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("source.sqlite3");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        path
    }

    #[test]
    fn test_transfer_copies_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixture(&dir);
        let mapping = convert_schema(&source).unwrap();
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();

        let options = TransferOptions::default().with_batch_size(2);
        let result = transfer_data(&source, &mapping, &mut target, &options).unwrap();

        assert!(result.is_success());
        assert_eq!(result.rows_for("users"), Some(2));
        assert_eq!(result.rows_for("posts"), Some(3));
        assert_eq!(target.count_rows("posts").unwrap(), Some(3));

        let author: i64 = target
            .connection()
            .query_row("SELECT author_id FROM posts WHERE id = 12", [], |r| r.get(0))
            .unwrap();
        assert_eq!(author, 5);
        let body: Vec<u8> = target
            .connection()
            .query_row("SELECT body FROM posts WHERE id = 10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(body, vec![0x00, 0xFF]);
        let indexes: i64 = target
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_posts_author'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 1);
    }

    #[test]
    fn test_dry_run_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixture(&dir);
        let mapping = convert_schema(&source).unwrap();
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();

        let options = TransferOptions::default().with_dry_run(true);
        let result = transfer_data(&source, &mapping, &mut target, &options).unwrap();

        assert!(result.dry_run);
        assert!(!result.committed);
        assert_eq!(result.rows_for("posts"), Some(3));
        assert_eq!(target.count_rows("users").unwrap(), None);
    }

    #[test]
    fn test_non_empty_target_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixture(&dir);
        let mapping = convert_schema(&source).unwrap();
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();
        target
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT); INSERT INTO users VALUES (99, 'x');")
            .unwrap();

        let result =
            transfer_data(&source, &mapping, &mut target, &TransferOptions::default()).unwrap();

        assert!(!result.is_success());
        assert!(!result.committed);
        assert_eq!(result.failures[0].table, "users");
        assert_eq!(result.failures[0].kind, TransferFailureKind::TargetNotEmpty);
        // the pre-existing row survives, nothing else was written
        assert_eq!(target.count_rows("users").unwrap(), Some(1));
        assert_eq!(target.count_rows("posts").unwrap(), None);
    }

    #[test]
    fn test_raise_on_error_returns_transfer_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixture(&dir);
        let mapping = convert_schema(&source).unwrap();
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();
        target
            .execute("CREATE TABLE posts (id INTEGER PRIMARY KEY); INSERT INTO posts VALUES (1);")
            .unwrap();

        let options = TransferOptions::default().with_raise_on_error(true);
        let err = transfer_data(&source, &mapping, &mut target, &options).unwrap_err();

        match err {
            MigrationError::Transfer { table, kind, .. } => {
                assert_eq!(table, "posts");
                assert_eq!(kind, TransferFailureKind::TargetNotEmpty);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(target.count_rows("users").unwrap(), None);
    }

    #[test]
    fn test_undecodable_text_is_copied_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let source = fixture(&dir);
        Connection::open(&source)
            .unwrap()
            .execute_batch("UPDATE posts SET title = CAST(X'FF61' AS TEXT) WHERE id = 11")
            .unwrap();
        let mapping = convert_schema(&source).unwrap();
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();

        let result =
            transfer_data(&source, &mapping, &mut target, &TransferOptions::default()).unwrap();
        assert!(result.is_success());

        let (kind, hex): (String, String) = target
            .connection()
            .query_row("SELECT typeof(title), hex(title) FROM posts WHERE id = 11", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(kind, "text");
        assert_eq!(hex, "FF61");
    }

    #[test]
    fn test_missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();
        let err = transfer_data(
            dir.path().join("missing.sqlite3"),
            &SchemaMapping::new(),
            &mut target,
            &TransferOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::SourceNotFound { .. }));
    }
}
