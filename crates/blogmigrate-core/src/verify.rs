//! Post-transfer verification.
//!
//! Counts rows in every source table and compares them with what reached the
//! target, either as recorded by [`transfer_data`](crate::transfer_data) or by
//! querying the target directly. Mismatches are reported, never raised.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::source::{self, open_source};
use crate::transfer::{TargetStore, TransferResult};

/// What to compare the source against.
pub enum VerifyAgainst<'a> {
    /// Counts recorded by a transfer run. An uncommitted run (dry run or
    /// rolled back) left nothing behind, so every target count is 0.
    Transfer(&'a TransferResult),
    /// Live counts queried from the target.
    Target(&'a mut dyn TargetStore),
}

/// Verification options.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Also compare per-column NULL counts. Only applies to live targets.
    pub column_checks: bool,
}

/// One problem found during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Row counts differ.
    RowCountMismatch { table: String, source: u64, target: u64 },
    /// NULL counts of a column differ.
    NullCountMismatch {
        table: String,
        column: String,
        source: u64,
        target: u64,
    },
    /// A count query failed.
    Unverifiable { table: String, reason: String },
}

impl Discrepancy {
    /// Table the discrepancy belongs to.
    pub fn table(&self) -> &str {
        match self {
            Discrepancy::RowCountMismatch { table, .. }
            | Discrepancy::NullCountMismatch { table, .. }
            | Discrepancy::Unverifiable { table, .. } => table,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::RowCountMismatch { table, source, target } => write!(
                f,
                "{}: row count mismatch (source {}, target {})",
                table, source, target
            ),
            Discrepancy::NullCountMismatch {
                table,
                column,
                source,
                target,
            } => write!(
                f,
                "{}.{}: null count mismatch (source {}, target {})",
                table, column, source, target
            ),
            Discrepancy::Unverifiable { table, reason } => {
                write!(f, "{}: could not verify: {}", table, reason)
            }
        }
    }
}

/// Outcome of a verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True iff `errors` is empty.
    pub success: bool,
    /// Source row counts.
    pub table_counts: BTreeMap<String, u64>,
    /// Target row counts.
    pub target_counts: BTreeMap<String, u64>,
    /// Discrepancies in table order.
    pub errors: Vec<Discrepancy>,
}

impl VerificationReport {
    /// Discrepancies for one table.
    pub fn errors_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Discrepancy> + 'a {
        self.errors.iter().filter(move |d| d.table() == table)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "verification {}: {} tables, {} discrepancies",
            if self.success { "passed" } else { "FAILED" },
            self.table_counts.len(),
            self.errors.len()
        )?;
        for (table, source) in &self.table_counts {
            let target = self.target_counts.get(table).copied().unwrap_or(0);
            writeln!(f, "  {:<32} {:>10} {:>10}", table, source, target)?;
        }
        for error in &self.errors {
            writeln!(f, "  {}", error)?;
        }
        Ok(())
    }
}

/// Compare source row counts with `against`, without column checks.
pub fn verify_migration(
    source_path: impl AsRef<Path>,
    against: VerifyAgainst<'_>,
) -> Result<VerificationReport> {
    verify_migration_with(source_path, against, VerifyOptions::default())
}

/// Compare source row counts (and optionally NULL counts) with `against`.
///
/// Only opening the source can fail; per-table problems end up in the
/// report as [`Discrepancy::Unverifiable`].
pub fn verify_migration_with(
    source_path: impl AsRef<Path>,
    mut against: VerifyAgainst<'_>,
    options: VerifyOptions,
) -> Result<VerificationReport> {
    let source = open_source(source_path.as_ref())?;
    let tables = source::user_tables(&source)?;

    let mut report = VerificationReport::default();

    for table in &tables {
        let source_rows = match source::count_rows(&source, table) {
            Ok(rows) => rows.unwrap_or(0),
            Err(err) => {
                report.errors.push(Discrepancy::Unverifiable {
                    table: table.clone(),
                    reason: format!("source: {}", err),
                });
                continue;
            }
        };
        report.table_counts.insert(table.clone(), source_rows);

        let target_rows = match &mut against {
            VerifyAgainst::Transfer(result) => {
                if result.committed {
                    result.rows_for(table).unwrap_or(0)
                } else {
                    0
                }
            }
            VerifyAgainst::Target(target) => match target.count_rows(table) {
                Ok(rows) => rows.unwrap_or(0),
                Err(err) => {
                    report.errors.push(Discrepancy::Unverifiable {
                        table: table.clone(),
                        reason: format!("target: {}", err),
                    });
                    continue;
                }
            },
        };
        report.target_counts.insert(table.clone(), target_rows);

        if source_rows != target_rows {
            report.errors.push(Discrepancy::RowCountMismatch {
                table: table.clone(),
                source: source_rows,
                target: target_rows,
            });
            continue;
        }

        if let VerifyAgainst::Target(target) = &mut against {
            if options.column_checks && target_rows > 0 {
                check_columns(&source, &mut **target, table, &mut report.errors);
            }
        }
    }

    report.success = report.errors.is_empty();
    for error in &report.errors {
        warn!(discrepancy = %error, "verification discrepancy");
    }
    info!(
        success = report.success,
        tables = report.table_counts.len(),
        discrepancies = report.errors.len(),
        "verification complete"
    );
    Ok(report)
}

fn check_columns(
    source: &Connection,
    target: &mut dyn TargetStore,
    table: &str,
    errors: &mut Vec<Discrepancy>,
) {
    let columns = match source::column_names(source, table) {
        Ok(columns) => columns,
        Err(err) => {
            errors.push(Discrepancy::Unverifiable {
                table: table.to_string(),
                reason: format!("source columns: {}", err),
            });
            return;
        }
    };

    for column in columns {
        let counts = source::count_nulls(source, table, &column)
            .and_then(|s| target.count_nulls(table, &column).map(|t| (s, t)));
        match counts {
            Ok((source, target)) if source != target => {
                errors.push(Discrepancy::NullCountMismatch {
                    table: table.to_string(),
                    column,
                    source,
                    target,
                });
            }
            Ok(_) => {}
            Err(err) => errors.push(Discrepancy::Unverifiable {
                table: table.to_string(),
                reason: format!("column {}: {}", column, err),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::SqliteTarget;
    use std::path::PathBuf;

    fn source_db(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("source.sqlite3");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, bio TEXT);
             CREATE TABLE articles (id INTEGER PRIMARY KEY, user_id INTEGER);
             INSERT INTO users VALUES (1, NULL), (2, 'hi'), (3, NULL);
             INSERT INTO articles VALUES (1, 1), (2, 1), (3, 2), (4, 3), (5, 3);",
        )
        .unwrap();
        path
    }

    fn committed(counts: &[(&str, u64)]) -> TransferResult {
        TransferResult {
            table_counts: counts.iter().map(|(t, n)| (t.to_string(), *n)).collect(),
            committed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_matching_counts_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_db(&dir);
        let result = committed(&[("users", 3), ("articles", 5)]);

        let report = verify_migration(&source, VerifyAgainst::Transfer(&result)).unwrap();

        assert!(report.success);
        assert!(report.errors.is_empty());
        assert_eq!(report.table_counts["users"], 3);
        assert_eq!(report.table_counts["articles"], 5);
    }

    #[test]
    fn test_mismatch_names_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_db(&dir);
        let result = committed(&[("users", 3), ("articles", 4)]);

        let report = verify_migration(&source, VerifyAgainst::Transfer(&result)).unwrap();

        assert!(!report.success);
        assert_eq!(
            report.errors,
            vec![Discrepancy::RowCountMismatch {
                table: "articles".to_string(),
                source: 5,
                target: 4,
            }]
        );
        assert_eq!(report.errors_for("users").count(), 0);
        assert!(report.to_string().contains("articles: row count mismatch"));
    }

    #[test]
    fn test_uncommitted_transfer_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_db(&dir);
        let mut result = committed(&[("users", 3), ("articles", 5)]);
        result.committed = false;

        let report = verify_migration(&source, VerifyAgainst::Transfer(&result)).unwrap();

        assert!(!report.success);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.target_counts["users"], 0);
    }

    #[test]
    fn test_live_target_missing_tables_count_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_db(&dir);
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();

        let report = verify_migration(&source, VerifyAgainst::Target(&mut target)).unwrap();

        assert!(!report.success);
        assert_eq!(report.target_counts["users"], 0);
        assert_eq!(report.target_counts["articles"], 0);
    }

    #[test]
    fn test_column_checks_find_null_drift() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_db(&dir);
        let mut target = SqliteTarget::open(dir.path().join("target.sqlite3")).unwrap();
        target
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, bio TEXT);
                 CREATE TABLE articles (id INTEGER PRIMARY KEY, user_id INTEGER);
                 INSERT INTO users VALUES (1, NULL), (2, 'hi'), (3, 'filled');
                 INSERT INTO articles VALUES (1, 1), (2, 1), (3, 2), (4, 3), (5, 3);",
            )
            .unwrap();

        let plain = verify_migration(&source, VerifyAgainst::Target(&mut target)).unwrap();
        assert!(plain.success);

        let checked = verify_migration_with(
            &source,
            VerifyAgainst::Target(&mut target),
            VerifyOptions { column_checks: true },
        )
        .unwrap();
        assert!(!checked.success);
        assert_eq!(
            checked.errors,
            vec![Discrepancy::NullCountMismatch {
                table: "users".to_string(),
                column: "bio".to_string(),
                source: 2,
                target: 1,
            }]
        );
    }

    #[test]
    fn test_report_serializes_with_tagged_errors() {
        let report = VerificationReport {
            success: false,
            errors: vec![Discrepancy::Unverifiable {
                table: "t".to_string(),
                reason: "boom".to_string(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["kind"], "unverifiable");
        assert_eq!(json["errors"][0]["table"], "t");
    }
}
