//! SQLite storage implementation.
//!
//! The connection is opened by the caller and handed to the engine; nothing
//! here keeps a global handle. Writes go through [`SqliteStorage::mutate`],
//! which wraps the work in an IMMEDIATE transaction and appends the
//! collected change-log entries before committing.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::Result;
use crate::storage::changelog::{ChangeLogEntry, insert_entry};
use crate::storage::schema::apply_schema;

/// Busy timeout applied when the caller does not configure one.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation, collecting side effects until commit.
#[derive(Debug)]
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Who the change log attributes changes to.
    pub actor: String,
    /// Entries written right before commit.
    pub changes: Vec<ChangeLogEntry>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            changes: Vec::new(),
        }
    }

    /// Queue change-log entries for this operation.
    pub fn record_changes(&mut self, entries: impl IntoIterator<Item = ChangeLogEntry>) {
        self.changes.extend(entries);
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies the bookkeeping schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(
            timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        ))?;
        apply_schema(&conn)?;
        debug!(path = %path.display(), "Opened database");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// 1. Begins an IMMEDIATE transaction (takes the write lock up front)
    /// 2. Executes the mutation closure
    /// 3. Writes queued change-log entries
    /// 4. Commits
    ///
    /// Any error drops the transaction, which rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns the first error from any step.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for entry in &ctx.changes {
            insert_entry(&tx, entry)?;
        }

        tx.commit()?;
        debug!(op, changes = ctx.changes.len(), "Committed");

        Ok(result)
    }

    /// Run `f` inside a transaction that is always rolled back.
    ///
    /// Schema changes made by `f` are discarded too, so a rehearsal leaves
    /// the database byte-for-byte as it was.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the rollback error if the closure
    /// succeeded.
    pub fn rehearse<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        let result = f(&tx);
        tx.rollback()?;
        debug!(op, "Rolled back rehearsal");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::changelog::entries_for_record;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_database_applies_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sheetsync.db");
        let storage = SqliteStorage::open_with_timeout(&path, Some(250)).unwrap();
        assert!(path.exists());
        let count: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM change_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_mutate_writes_changes_on_commit() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .mutate("test", "tester", |_, ctx| {
                ctx.record_changes([ChangeLogEntry::new("t", 1, "f", &ctx.actor)]);
                Ok(())
            })
            .unwrap();
        let entries = entries_for_record(storage.conn(), "t", 1, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].changed_by, "tester");
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let result: Result<()> = storage.mutate("test", "tester", |tx, ctx| {
            tx.execute_batch("CREATE TABLE scratch (x INTEGER)")?;
            ctx.record_changes([ChangeLogEntry::new("t", 1, "f", "tester")]);
            Err(crate::Error::Other("boom".to_string()))
        });
        assert!(result.is_err());

        let tables: i64 = storage
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
        assert!(entries_for_record(storage.conn(), "t", 1, None).unwrap().is_empty());
    }

    #[test]
    fn test_rehearse_always_rolls_back() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let seen: i64 = storage
            .rehearse("test", |tx| {
                tx.execute_batch("CREATE TABLE scratch (x INTEGER); INSERT INTO scratch VALUES (1);")?;
                Ok(tx.query_row("SELECT COUNT(*) FROM scratch", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(seen, 1);

        let tables: i64 = storage
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
