//! blogmigrate core - moves a SQLite database into PostgreSQL.
//!
//! The pipeline runs four steps in order:
//!
//! 1. [`backup`] snapshots the source database file so it can be restored.
//! 2. [`schema`] reads the source catalog and produces a [`SchemaMapping`]
//!    with PostgreSQL types and defaults.
//! 3. [`transfer`] copies every table inside a single target transaction,
//!    parents before children, and rolls everything back on failure.
//! 4. [`verify`] compares source row counts with what reached the target.
//!
//! [`pipeline::MigrationRunner`] drives the steps and tracks the run through
//! the states in [`state`].
//!
//! # Example
//!
//! ```ignore
//! use blogmigrate_core::{convert_schema, transfer_data, verify_migration};
//! use blogmigrate_core::transfer::{SqliteTarget, TransferOptions};
//! use blogmigrate_core::verify::VerifyAgainst;
//!
//! let mapping = convert_schema("db.sqlite3")?;
//! let mut target = SqliteTarget::open("copy.sqlite3")?;
//! let result = transfer_data("db.sqlite3", &mapping, &mut target, &TransferOptions::default())?;
//! let report = verify_migration("db.sqlite3", VerifyAgainst::Transfer(&result))?;
//! assert!(report.success);
//! ```

pub mod backup;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod state;
pub mod transfer;
pub mod verify;

pub use backup::{BackupManager, BackupRecord, RollbackOutcome};
pub use config::{MigrationConfig, TargetConfig};
pub use error::{MigrationError, Result, TransferFailureKind};
pub use pipeline::{MigrationRunner, RunOutcome};
pub use schema::{
    convert_schema, ColumnMapping, ConversionWarning, ConversionWarningKind, Dialect,
    ForeignKeyMapping, IndexMapping, IndexOrigin, SchemaMapping, TableMapping,
};
pub use state::{RunState, RunTracker};
pub use transfer::{
    transfer_data, SqlValue, SqliteTarget, TableFailure, TargetStore, TransferOptions,
    TransferResult,
};
pub use verify::{
    verify_migration, verify_migration_with, Discrepancy, VerificationReport, VerifyAgainst,
    VerifyOptions,
};

#[cfg(feature = "postgres")]
pub use transfer::PostgresTarget;
