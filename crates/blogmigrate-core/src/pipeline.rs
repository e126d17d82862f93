//! End-to-end migration runs.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backup::{BackupRecord, RollbackOutcome};
use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::schema::{convert_schema, SchemaMapping};
use crate::state::{RunState, RunTracker};
use crate::transfer::{transfer_data, TargetStore, TransferResult};
use crate::verify::{verify_migration, verify_migration_with, VerificationReport, VerifyAgainst};

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub state: RunState,
    pub backup: Option<BackupRecord>,
    pub schema: SchemaMapping,
    pub transfer: TransferResult,
    /// Absent for dry runs and rolled-back runs.
    pub report: Option<VerificationReport>,
    pub rollback: Option<RollbackOutcome>,
}

impl RunOutcome {
    /// True when the data was committed and verification passed, or a dry
    /// run completed.
    pub fn is_success(&self) -> bool {
        match self.state {
            RunState::Verified { success } => success,
            RunState::SchemaConverted => self.transfer.dry_run && self.transfer.is_success(),
            _ => false,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "migration {}", self.state)?;
        if let Some(backup) = &self.backup {
            writeln!(f, "backup: {}", backup.path.display())?;
        }
        write!(f, "{}", self.transfer)?;
        if let Some(report) = &self.report {
            write!(f, "{}", report)?;
        }
        if let Some(rollback) = &self.rollback {
            writeln!(f, "{}", rollback)?;
        }
        Ok(())
    }
}

/// Drives one migration: backup, schema conversion, transfer, verification.
///
/// A runner is good for a single [`run`](Self::run); its state machine
/// rejects a second one.
pub struct MigrationRunner {
    config: MigrationConfig,
    tracker: RunTracker,
    backup: Option<BackupRecord>,
}

impl MigrationRunner {
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            tracker: RunTracker::new(),
            backup: None,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.tracker.state()
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    /// Run the migration into `target`.
    ///
    /// A missing source fails before anything is written. A transfer error
    /// (with `raise_on_error`) is returned after the optional automatic
    /// rollback; recorded table failures end in a failed verification, or
    /// in a rollback when `auto_rollback` is set.
    pub fn run(&mut self, target: &mut dyn TargetStore) -> Result<RunOutcome> {
        let source = self.config.source_path.clone();
        if !source.is_file() {
            return Err(MigrationError::SourceNotFound { path: source });
        }
        if self.tracker.state() != RunState::NotStarted {
            return Err(MigrationError::InvalidTransition {
                from: self.tracker.state(),
                to: RunState::BackedUp,
            });
        }

        info!(
            source = %source.display(),
            target = %target.describe(),
            dry_run = self.config.dry_run,
            "starting migration"
        );

        if self.config.takes_backup() {
            let record = self.config.backup_manager().create_backup(&source)?;
            self.tracker.advance(RunState::BackedUp)?;
            self.backup = Some(record);
        }

        let schema = convert_schema(&source)?;
        self.tracker.advance(RunState::SchemaConverted)?;
        info!(
            tables = schema.len(),
            warnings = schema.warnings.len(),
            "schema converted"
        );

        let transfer = match transfer_data(&source, &schema, target, &self.config.transfer_options()) {
            Ok(transfer) => transfer,
            Err(err) => {
                error!(error = %err, "transfer aborted");
                if self.config.auto_rollback && self.backup.is_some() {
                    let outcome = self.rollback();
                    info!(success = outcome.success, "automatic rollback finished");
                }
                return Err(err);
            }
        };

        if transfer.dry_run {
            info!(rows = transfer.total_rows(), "dry run finished");
            return Ok(self.outcome(schema, transfer, None, None));
        }

        if !transfer.is_success() && self.config.auto_rollback && self.backup.is_some() {
            warn!(failed = transfer.failures.len(), "transfer failed, rolling back");
            let rollback = self.rollback();
            return Ok(self.outcome(schema, transfer, None, Some(rollback)));
        }
        self.tracker.advance(RunState::DataTransferred)?;

        let report = if self.config.column_checks {
            verify_migration_with(
                &source,
                VerifyAgainst::Target(target),
                self.config.verify_options(),
            )?
        } else {
            verify_migration(&source, VerifyAgainst::Transfer(&transfer))?
        };
        self.tracker.advance(RunState::Verified {
            success: report.success,
        })?;

        info!(state = %self.tracker.state(), "migration finished");
        Ok(self.outcome(schema, transfer, Some(report), None))
    }

    /// Restore the backup taken by this run, or the latest one in the backup
    /// directory if this run took none.
    pub fn rollback(&mut self) -> RollbackOutcome {
        let manager = self.config.backup_manager();
        let outcome = match &self.backup {
            Some(record) => manager.rollback_to(record),
            None => manager.rollback_to_sqlite(),
        };

        if outcome.success {
            if let Err(err) = self.tracker.advance(RunState::RolledBack) {
                debug!(error = %err, "run state left unchanged by rollback");
            }
            info!(state = %self.tracker.state(), "rolled back");
        }
        outcome
    }

    fn outcome(
        &self,
        schema: SchemaMapping,
        transfer: TransferResult,
        report: Option<VerificationReport>,
        rollback: Option<RollbackOutcome>,
    ) -> RunOutcome {
        RunOutcome {
            state: self.tracker.state(),
            backup: self.backup.clone(),
            schema,
            transfer,
            report,
            rollback,
        }
    }
}
