//! Transfer results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, TransferFailureKind};

/// A table that could not be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    /// Table name.
    pub table: String,
    /// Structured failure classification.
    pub kind: TransferFailureKind,
    /// Driver error message.
    pub message: String,
}

impl TableFailure {
    /// Record `err` as the failure of `table`.
    pub fn from_error(table: impl Into<String>, err: &MigrationError) -> Self {
        Self {
            table: table.into(),
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }

    /// Turn this failure into the error raised to the caller.
    pub fn into_error(self) -> MigrationError {
        MigrationError::Transfer {
            table: self.table,
            kind: self.kind,
            message: self.message,
        }
    }
}

/// What one transfer invocation moved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Rows copied per table (rows counted, for a dry run).
    pub table_counts: BTreeMap<String, u64>,
    /// Tables that failed, in processing order.
    pub failures: Vec<TableFailure>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Whether the target transaction was committed.
    pub committed: bool,
}

impl TransferResult {
    /// Rows recorded for a table.
    pub fn rows_for(&self, table: &str) -> Option<u64> {
        self.table_counts.get(table).copied()
    }

    /// Total rows across all tables.
    pub fn total_rows(&self) -> u64 {
        self.table_counts.values().sum()
    }

    /// True when nothing failed and the data was committed (or this was a dry run).
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && (self.committed || self.dry_run)
    }
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would transfer" } else { "transferred" };
        writeln!(
            f,
            "{} {} rows across {} tables{}",
            verb,
            self.total_rows(),
            self.table_counts.len(),
            if self.dry_run || self.committed { "" } else { " (rolled back)" }
        )?;
        for (table, rows) in &self.table_counts {
            writeln!(f, "  {:<32} {:>10}", table, rows)?;
        }
        for failure in &self.failures {
            writeln!(f, "  FAILED {} ({}): {}", failure.table, failure.kind, failure.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rules() {
        let mut result = TransferResult {
            committed: true,
            ..Default::default()
        };
        result.table_counts.insert("users".to_string(), 3);
        result.table_counts.insert("articles".to_string(), 5);
        assert!(result.is_success());
        assert_eq!(result.total_rows(), 8);
        assert_eq!(result.rows_for("users"), Some(3));
        assert_eq!(result.rows_for("tags"), None);

        let rolled_back = TransferResult::default();
        assert!(!rolled_back.is_success());

        let dry = TransferResult {
            dry_run: true,
            ..Default::default()
        };
        assert!(dry.is_success());
    }

    #[test]
    fn test_failure_into_error() {
        let failure = TableFailure::from_error(
            "articles",
            &MigrationError::TargetNotEmpty {
                table: "articles".to_string(),
                rows: 2,
            },
        );
        assert_eq!(failure.kind, TransferFailureKind::TargetNotEmpty);

        let err = failure.into_error();
        assert!(matches!(
            err,
            MigrationError::Transfer { ref table, kind: TransferFailureKind::TargetNotEmpty, .. } if table == "articles"
        ));
    }

    #[test]
    fn test_display_marks_rollback() {
        let mut result = TransferResult::default();
        result.table_counts.insert("users".to_string(), 3);
        assert!(result.to_string().contains("(rolled back)"));
    }
}
