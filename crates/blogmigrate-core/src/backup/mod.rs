//! Source database backups.
//!
//! Before any migration touches a target, the source SQLite file is copied
//! into a backup directory under a timestamped name, optionally gzipped,
//! with a JSON manifest recording its SHA-256. Restoring verifies the
//! checksum and swaps the file into place atomically.

mod manager;
mod record;

pub use manager::{BackupManager, RollbackOutcome, DEFAULT_BACKUP_DIR};
pub use record::BackupRecord;
