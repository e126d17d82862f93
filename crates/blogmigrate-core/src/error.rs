//! Error types for the migration pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::RunState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Why a table (or the final commit) could not be written to the target.
///
/// Derived from driver error codes, never from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFailureKind {
    /// A primary key or unique constraint rejected a row.
    UniqueViolation,
    /// A row referenced a parent that does not exist.
    ForeignKeyViolation,
    /// A NULL reached a NOT NULL column.
    NotNullViolation,
    /// A CHECK constraint rejected a row.
    CheckViolation,
    /// A value could not be represented in the target column type.
    InvalidValue,
    /// The target table already held rows before the copy started.
    TargetNotEmpty,
    /// Anything else (I/O, connection loss, bad DDL, ...).
    Other,
}

impl fmt::Display for TransferFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferFailureKind::UniqueViolation => write!(f, "unique_violation"),
            TransferFailureKind::ForeignKeyViolation => write!(f, "foreign_key_violation"),
            TransferFailureKind::NotNullViolation => write!(f, "not_null_violation"),
            TransferFailureKind::CheckViolation => write!(f, "check_violation"),
            TransferFailureKind::InvalidValue => write!(f, "invalid_value"),
            TransferFailureKind::TargetNotEmpty => write!(f, "target_not_empty"),
            TransferFailureKind::Other => write!(f, "other"),
        }
    }
}

/// Migration pipeline errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The source database file does not exist.
    #[error("source database not found: {}", path.display())]
    SourceNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error (source database or SQLite target).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL error.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A target table already contains rows.
    #[error("target table {table} already contains {rows} rows")]
    TargetNotEmpty {
        /// Table name.
        table: String,
        /// Rows found in the target.
        rows: u64,
    },

    /// Copying a table failed; the target transaction was rolled back.
    #[error("transfer of table {table} failed ({kind}): {message}")]
    Transfer {
        /// Table being copied when the failure happened.
        table: String,
        /// Structured failure classification.
        kind: TransferFailureKind,
        /// Driver error message.
        message: String,
    },

    /// A source value has no representation the target accepts.
    #[error("invalid value in {table}.{column}: {reason}")]
    InvalidValue {
        /// Table being copied.
        table: String,
        /// Column holding the value.
        column: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The final commit was rejected; the target transaction was rolled back.
    #[error("commit of target transaction failed ({kind}): {message}")]
    Commit {
        /// Structured failure classification.
        kind: TransferFailureKind,
        /// Driver error message.
        message: String,
    },

    /// A migration run was asked to move to a state it cannot reach.
    #[error("invalid migration state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: RunState,
        /// Requested state.
        to: RunState,
    },

    /// No backup is available to restore.
    #[error("no backup found in {}", dir.display())]
    BackupNotFound {
        /// Backup directory that was searched.
        dir: PathBuf,
    },

    /// A backup file no longer matches the checksum recorded at creation.
    #[error("backup checksum mismatch for {}: expected {expected}, found {actual}", path.display())]
    ChecksumMismatch {
        /// Backup file.
        path: PathBuf,
        /// Checksum from the manifest.
        expected: String,
        /// Checksum of the file contents.
        actual: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    /// Classify this error for transfer failure reporting.
    pub fn failure_kind(&self) -> TransferFailureKind {
        match self {
            MigrationError::Sqlite(err) => classify_sqlite(err),
            #[cfg(feature = "postgres")]
            MigrationError::Postgres(err) => classify_postgres(err),
            MigrationError::TargetNotEmpty { .. } => TransferFailureKind::TargetNotEmpty,
            MigrationError::InvalidValue { .. } => TransferFailureKind::InvalidValue,
            MigrationError::Transfer { kind, .. } | MigrationError::Commit { kind, .. } => *kind,
            _ => TransferFailureKind::Other,
        }
    }
}

fn classify_sqlite(err: &rusqlite::Error) -> TransferFailureKind {
    use rusqlite::ffi;

    let rusqlite::Error::SqliteFailure(failure, _) = err else {
        return match err {
            rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::IntegralValueOutOfRange(..) => {
                TransferFailureKind::InvalidValue
            }
            _ => TransferFailureKind::Other,
        };
    };

    match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            TransferFailureKind::UniqueViolation
        }
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => TransferFailureKind::ForeignKeyViolation,
        ffi::SQLITE_CONSTRAINT_NOTNULL => TransferFailureKind::NotNullViolation,
        ffi::SQLITE_CONSTRAINT_CHECK => TransferFailureKind::CheckViolation,
        _ => match failure.code {
            rusqlite::ErrorCode::TypeMismatch | rusqlite::ErrorCode::TooBig => {
                TransferFailureKind::InvalidValue
            }
            _ => TransferFailureKind::Other,
        },
    }
}

#[cfg(feature = "postgres")]
fn classify_postgres(err: &sqlx::Error) -> TransferFailureKind {
    use sqlx::error::ErrorKind;

    let sqlx::Error::Database(db_err) = err else {
        return TransferFailureKind::Other;
    };

    match db_err.kind() {
        ErrorKind::UniqueViolation => TransferFailureKind::UniqueViolation,
        ErrorKind::ForeignKeyViolation => TransferFailureKind::ForeignKeyViolation,
        ErrorKind::NotNullViolation => TransferFailureKind::NotNullViolation,
        ErrorKind::CheckViolation => TransferFailureKind::CheckViolation,
        _ => {
            // SQLSTATE class 22: data exception (bad input syntax, overflow, ...)
            let data_exception = db_err
                .code()
                .map(|code| code.starts_with("22"))
                .unwrap_or(false);
            if data_exception {
                TransferFailureKind::InvalidValue
            } else {
                TransferFailureKind::Other
            }
        }
    }
}
