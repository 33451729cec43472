//! Command implementations.

pub mod changelog;
pub mod ensure_table;
pub mod import;
pub mod init;
pub mod preview;
pub mod version;

use std::path::PathBuf;

use crate::config::{resolve_busy_timeout, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;

/// Resolve the database path without requiring the file to exist.
pub(crate) fn database_path(db_path: Option<&PathBuf>) -> Result<PathBuf> {
    resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine the database location".to_string()))
}

/// Open an existing database for a command.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if the database file does not exist.
pub(crate) fn open_storage(db_path: Option<&PathBuf>, busy_timeout_ms: Option<u64>) -> Result<SqliteStorage> {
    let path = database_path(db_path)?;
    if !path.exists() {
        return Err(Error::NotInitialized { path });
    }
    let timeout = resolve_busy_timeout(busy_timeout_ms)?;
    SqliteStorage::open_with_timeout(&path, Some(timeout))
}
