//! Command-line arguments.

use std::path::PathBuf;

use blogmigrate_core::backup::DEFAULT_BACKUP_DIR;
use blogmigrate_core::config::DEFAULT_MAX_CONNECTIONS;
use blogmigrate_core::transfer::DEFAULT_BATCH_SIZE;
use blogmigrate_core::{MigrationConfig, TargetConfig};
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::output::OutputFormat;

/// Migrate a SQLite database into PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "blogmigrate")]
#[command(version, about = "Migrate a SQLite database into PostgreSQL", long_about = None)]
pub struct Args {
    /// Source SQLite database.
    #[arg(short, long, global = true, env = "BLOGMIGRATE_SOURCE", default_value = "db.sqlite3")]
    pub source: PathBuf,

    /// PostgreSQL connection URL.
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Migrate into another SQLite file instead (takes precedence over --database-url).
    #[arg(long, global = true)]
    pub sqlite_target: Option<PathBuf>,

    /// Directory for source backups.
    #[arg(long, global = true, default_value = DEFAULT_BACKUP_DIR)]
    pub backup_dir: PathBuf,

    /// PostgreSQL connection pool size.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// Output format.
    #[arg(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Back up, convert, transfer and verify.
    Migrate(MigrateArgs),
    /// Print the converted schema mapping as JSON.
    Schema,
    /// Compare source row counts with the target.
    Verify {
        /// Also compare NULL counts per column.
        #[arg(long)]
        column_checks: bool,
    },
    /// Back up the source database.
    Backup {
        /// Gzip the backup.
        #[arg(long)]
        compress: bool,
    },
    /// List backups, oldest first.
    Backups,
    /// Restore a backup over the source database.
    Rollback {
        /// Backup file to restore (defaults to the most recent).
        #[arg(long)]
        backup: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct MigrateArgs {
    /// Count rows without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first failing table.
    #[arg(long)]
    pub raise_on_error: bool,

    /// Do not back up the source first.
    #[arg(long)]
    pub skip_backup: bool,

    /// Rows per insert batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Gzip the backup.
    #[arg(long)]
    pub compress: bool,

    /// Restore the backup if the transfer fails.
    #[arg(long)]
    pub auto_rollback: bool,

    /// Also compare NULL counts per column during verification.
    #[arg(long)]
    pub column_checks: bool,
}

impl Args {
    /// Convert command-line arguments to a migration configuration.
    pub fn into_config(self) -> MigrationConfig {
        let target = match (self.sqlite_target, self.database_url) {
            (Some(path), _) => Some(TargetConfig::Sqlite { path }),
            (None, Some(url)) => Some(TargetConfig::Postgres {
                url,
                max_connections: self.max_connections.max(1),
            }),
            (None, None) => None,
        };

        let mut config = MigrationConfig::new(self.source).with_backup_dir(self.backup_dir);
        config.target = target;

        match self.command {
            Command::Migrate(migrate) => config
                .dry_run(migrate.dry_run)
                .raise_on_error(migrate.raise_on_error)
                .skip_backup(migrate.skip_backup)
                .with_batch_size(migrate.batch_size)
                .compress_backups(migrate.compress)
                .auto_rollback(migrate.auto_rollback)
                .column_checks(migrate.column_checks),
            Command::Verify { column_checks } => config.column_checks(column_checks),
            Command::Backup { compress } => config.compress_backups(compress),
            Command::Schema | Command::Backups | Command::Rollback { .. } => config,
        }
    }
}
