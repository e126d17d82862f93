//! Migration run state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrationError, Result};

/// Where a migration run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    BackedUp,
    SchemaConverted,
    DataTransferred,
    Verified { success: bool },
    RolledBack,
}

impl RunState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Verified { .. } | RunState::RolledBack)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not_started"),
            RunState::BackedUp => write!(f, "backed_up"),
            RunState::SchemaConverted => write!(f, "schema_converted"),
            RunState::DataTransferred => write!(f, "data_transferred"),
            RunState::Verified { success: true } => write!(f, "verified(success)"),
            RunState::Verified { success: false } => write!(f, "verified(failed)"),
            RunState::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// A state change with the time it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Utc>,
}

/// Tracks one run through its states, rejecting illegal moves.
#[derive(Debug, Clone)]
pub struct RunTracker {
    state: RunState,
    backed_up: bool,
    history: Vec<Transition>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            state: RunState::NotStarted,
            backed_up: false,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Whether a backup was taken during this run.
    pub fn has_backup(&self) -> bool {
        self.backed_up
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Check whether `next` is reachable from the current state.
    pub fn can_advance(&self, next: RunState) -> bool {
        use RunState::*;

        match (self.state, next) {
            (NotStarted, BackedUp) => true,
            // dry runs and --skip-backup go straight to conversion
            (NotStarted, SchemaConverted) => true,
            (BackedUp, SchemaConverted) => true,
            (SchemaConverted, DataTransferred) => true,
            (DataTransferred, Verified { .. }) => true,
            (from, RolledBack) => self.backed_up && !from.is_terminal() && from != NotStarted,
            _ => false,
        }
    }

    /// Move to `next`, or fail with [`MigrationError::InvalidTransition`].
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.can_advance(next) {
            return Err(MigrationError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!(from = %self.state, to = %next, "run state transition");
        if next == RunState::BackedUp {
            self.backed_up = true;
        }
        self.history.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }
}
