//! Subcommand implementations.

use std::path::Path;

use blogmigrate_core::{
    convert_schema, verify_migration_with, BackupManager, BackupRecord, MigrationConfig,
    MigrationError, MigrationRunner, VerifyAgainst,
};
use thiserror::Error;
use tracing::info;

use crate::args::Command;
use crate::output::{render, BackupLine, BackupList, OutputFormat};

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("backup {} not found in {}", .backup.display(), .dir.display())]
    UnknownBackup {
        backup: std::path::PathBuf,
        dir: std::path::PathBuf,
    },
}

/// Run a subcommand. `Ok(false)` means it ran but did not succeed
/// (failed verification, rolled-back transfer, failed restore).
pub fn run(command: Command, config: MigrationConfig, format: OutputFormat) -> Result<bool, CliError> {
    match command {
        Command::Migrate(_) => migrate(&config, format),
        Command::Schema => schema(&config),
        Command::Verify { .. } => verify(&config, format),
        Command::Backup { .. } => backup(&config, format),
        Command::Backups => list_backups(&config, format),
        Command::Rollback { backup } => rollback(&config, backup.as_deref(), format),
    }
}

fn migrate(config: &MigrationConfig, format: OutputFormat) -> Result<bool, CliError> {
    let mut target = config.open_target()?;
    let mut runner = MigrationRunner::new(config.clone());
    let outcome = runner.run(target.as_mut())?;

    print!("{}", render(format, &outcome)?);
    Ok(outcome.is_success())
}

fn schema(config: &MigrationConfig) -> Result<bool, CliError> {
    let mapping = convert_schema(&config.source_path)?;
    println!("{}", mapping.to_json()?);
    Ok(true)
}

fn verify(config: &MigrationConfig, format: OutputFormat) -> Result<bool, CliError> {
    let mut target = config.open_target()?;
    let report = verify_migration_with(
        &config.source_path,
        VerifyAgainst::Target(target.as_mut()),
        config.verify_options(),
    )?;

    print!("{}", render(format, &report)?);
    Ok(report.success)
}

fn backup(config: &MigrationConfig, format: OutputFormat) -> Result<bool, CliError> {
    let record = config.backup_manager().create_backup(&config.source_path)?;
    println!("{}", render(format, &BackupLine(&record))?);
    Ok(true)
}

fn list_backups(config: &MigrationConfig, format: OutputFormat) -> Result<bool, CliError> {
    let backups = config.backup_manager().list_backups()?;
    print!("{}", render(format, &BackupList(backups))?);
    Ok(true)
}

fn rollback(
    config: &MigrationConfig,
    backup: Option<&Path>,
    format: OutputFormat,
) -> Result<bool, CliError> {
    let manager = config.backup_manager();
    let outcome = match backup {
        Some(wanted) => {
            let record = find_backup(&manager, wanted)?;
            manager.rollback_to(&record)
        }
        None => manager.rollback_to_sqlite(),
    };

    info!(success = outcome.success, "rollback finished");
    println!("{}", render(format, &outcome)?);
    Ok(outcome.success)
}

/// Match a backup by path or by file name.
fn find_backup(manager: &BackupManager, wanted: &Path) -> Result<BackupRecord, CliError> {
    manager
        .list_backups()?
        .into_iter()
        .find(|record| {
            record.path == wanted
                || (wanted.components().count() == 1 && record.path.file_name() == wanted.file_name())
        })
        .ok_or_else(|| CliError::UnknownBackup {
            backup: wanted.to_path_buf(),
            dir: manager.backup_dir().to_path_buf(),
        })
}
