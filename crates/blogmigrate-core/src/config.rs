//! Migration configuration.

use std::fmt;
use std::path::PathBuf;

use crate::backup::{BackupManager, DEFAULT_BACKUP_DIR};
use crate::error::{MigrationError, Result};
use crate::transfer::{SqliteTarget, TargetStore, TransferOptions, DEFAULT_BATCH_SIZE};
use crate::verify::VerifyOptions;

/// Default size of the PostgreSQL connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Where migrated data goes.
#[derive(Clone, PartialEq, Eq)]
pub enum TargetConfig {
    /// A PostgreSQL database.
    Postgres { url: String, max_connections: u32 },
    /// Another SQLite file, for rehearsals.
    Sqlite { path: PathBuf },
}

impl TargetConfig {
    /// PostgreSQL target with the default pool size.
    pub fn postgres(url: impl Into<String>) -> Self {
        TargetConfig::Postgres {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// SQLite file target.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        TargetConfig::Sqlite { path: path.into() }
    }

    /// Connect to the target.
    pub fn open(&self) -> Result<Box<dyn TargetStore>> {
        match self {
            #[cfg(feature = "postgres")]
            TargetConfig::Postgres {
                url,
                max_connections,
            } => Ok(Box::new(crate::transfer::PostgresTarget::connect(
                url,
                *max_connections,
            )?)),
            #[cfg(not(feature = "postgres"))]
            TargetConfig::Postgres { .. } => Err(MigrationError::Config(
                "built without PostgreSQL support (enable the `postgres` feature)".to_string(),
            )),
            TargetConfig::Sqlite { path } => Ok(Box::new(SqliteTarget::open(path)?)),
        }
    }
}

// Hand-written so connection URLs with passwords never end up in logs.
impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetConfig::Postgres {
                max_connections, ..
            } => f
                .debug_struct("Postgres")
                .field("url", &"<redacted>")
                .field("max_connections", max_connections)
                .finish(),
            TargetConfig::Sqlite { path } => f.debug_struct("Sqlite").field("path", path).finish(),
        }
    }
}

/// Settings for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Source SQLite database.
    pub source_path: PathBuf,

    /// Target database. `None` is only valid for commands that never write.
    pub target: Option<TargetConfig>,

    /// Directory backups are written to.
    pub backup_dir: PathBuf,

    /// Rows per insert batch.
    pub batch_size: usize,

    /// Count rows instead of copying them.
    pub dry_run: bool,

    /// Abort on the first failing table.
    pub raise_on_error: bool,

    /// Do not back up the source before migrating.
    pub skip_backup: bool,

    /// Gzip backups.
    pub compress_backups: bool,

    /// Restore the backup automatically when the transfer fails.
    pub auto_rollback: bool,

    /// Compare per-column NULL counts during verification.
    pub column_checks: bool,
}

impl MigrationConfig {
    /// Create a configuration for the given source database.
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            target: None,
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            raise_on_error: false,
            skip_backup: false,
            compress_backups: false,
            auto_rollback: false,
            column_checks: false,
        }
    }

    /// Set the target database.
    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the backup directory.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    /// Set the insert batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Enable or disable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Abort on the first failing table.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Skip the pre-migration backup.
    pub fn skip_backup(mut self, skip: bool) -> Self {
        self.skip_backup = skip;
        self
    }

    /// Gzip backups.
    pub fn compress_backups(mut self, compress: bool) -> Self {
        self.compress_backups = compress;
        self
    }

    /// Restore the backup when the transfer fails.
    pub fn auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    /// Compare NULL counts per column during verification.
    pub fn column_checks(mut self, enabled: bool) -> Self {
        self.column_checks = enabled;
        self
    }

    /// Whether this run takes a backup first.
    pub fn takes_backup(&self) -> bool {
        !self.dry_run && !self.skip_backup
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::default()
            .with_dry_run(self.dry_run)
            .with_raise_on_error(self.raise_on_error)
            .with_batch_size(self.batch_size)
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            column_checks: self.column_checks,
        }
    }

    /// Backup manager for the source database.
    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(&self.backup_dir, &self.source_path)
            .with_compression(self.compress_backups)
    }

    /// Connect to the configured target.
    pub fn open_target(&self) -> Result<Box<dyn TargetStore>> {
        match &self.target {
            Some(target) => target.open(),
            None => Err(MigrationError::Config(
                "no target configured (set --database-url or --sqlite-target)".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::new("blog.sqlite3");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.backup_dir, PathBuf::from(DEFAULT_BACKUP_DIR));
        assert!(config.takes_backup());
        assert!(config.target.is_none());
    }

    #[test]
    fn test_builders_flow_into_options() {
        let config = MigrationConfig::new("blog.sqlite3")
            .with_batch_size(0)
            .dry_run(true)
            .raise_on_error(true)
            .column_checks(true);

        let options = config.transfer_options();
        assert_eq!(options.batch_size, 1);
        assert!(options.dry_run);
        assert!(options.raise_on_error);
        assert!(config.verify_options().column_checks);
        assert!(!config.takes_backup());
    }

    #[test]
    fn test_missing_target_is_config_error() {
        let config = MigrationConfig::new("blog.sqlite3");
        assert!(matches!(
            config.open_target(),
            Err(MigrationError::Config(_))
        ));
    }

    #[test]
    fn test_sqlite_target_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = MigrationConfig::new("blog.sqlite3")
            .with_target(TargetConfig::sqlite(dir.path().join("copy.sqlite3")));
        let target = config.open_target().unwrap();
        assert!(target.describe().starts_with("sqlite:"));
    }

    #[test]
    fn test_debug_hides_url() {
        let target = TargetConfig::postgres("postgres://app:hunter2@db/blog");
        let rendered = format!("{:?}", target);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("max_connections: 4"));
    }
}
