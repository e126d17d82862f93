//! Target store abstraction.

use crate::error::Result;
use crate::schema::{Dialect, TableMapping};

use super::value::SqlValue;

/// A database the migration writes into.
///
/// The pipeline is synchronous; implementations wrapping async drivers
/// block on their own runtime. All writes between [`begin`](Self::begin)
/// and [`commit`](Self::commit) must belong to one transaction.
pub trait TargetStore {
    /// SQL dialect used to render DDL and inserts for this store.
    fn dialect(&self) -> Dialect;

    /// Human-readable location, safe to log.
    fn describe(&self) -> String;

    /// Open the migration transaction.
    fn begin(&mut self) -> Result<()>;

    /// Commit the migration transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the migration transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Execute a single statement without parameters.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Insert rows whose values follow `table.columns` order. Returns rows written.
    fn insert_rows(&mut self, table: &TableMapping, rows: &[Vec<SqlValue>]) -> Result<u64>;

    /// Row count of a table, or `None` if it does not exist.
    fn count_rows(&mut self, table: &str) -> Result<Option<u64>>;

    /// Number of NULLs in a column.
    fn count_nulls(&mut self, table: &str, column: &str) -> Result<u64>;

    /// Hook run once a table and its indexes are fully loaded.
    fn finish_table(&mut self, _table: &TableMapping) -> Result<()> {
        Ok(())
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("SAVEPOINT {}", name))
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name))
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
    }
}
