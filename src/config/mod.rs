//! Configuration management.
//!
//! This module resolves where the database lives, how long a writer waits
//! for the lock, and who the change log attributes upserts to. Department
//! profiles live in [`departments`].
//!
//! # Layout
//!
//! - **Database**: `~/.sheetsync/data/sheetsync.db` unless overridden
//! - **Overrides**: `SHEETSYNC_DB`, `SHEETSYNC_BUSY_TIMEOUT_MS`,
//!   `SHEETSYNC_ACTOR`, each shadowed by the matching CLI flag

pub mod departments;

pub use departments::{DEPARTMENTS, DepartmentProfile, department};

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use crate::sync::tracker::DEFAULT_CHANGED_BY;

/// Get the global sheetsync directory location (`~/.sheetsync/`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".sheetsync"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `SHEETSYNC_DB` environment variable
/// 3. Global location: `~/.sheetsync/data/sheetsync.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(db_path) = non_empty_env("SHEETSYNC_DB") {
        return Some(PathBuf::from(db_path));
    }

    global_dir().map(|dir| dir.join("data").join("sheetsync.db"))
}

/// Resolve the busy timeout in milliseconds.
///
/// Priority:
/// 1. Explicit value
/// 2. `SHEETSYNC_BUSY_TIMEOUT_MS` environment variable
/// 3. 5000
///
/// # Errors
///
/// Returns [`Error::Config`] if the environment variable is not a number.
pub fn resolve_busy_timeout(explicit: Option<u64>) -> Result<u64> {
    if let Some(ms) = explicit {
        return Ok(ms);
    }

    match non_empty_env("SHEETSYNC_BUSY_TIMEOUT_MS") {
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::Config(format!(
                "SHEETSYNC_BUSY_TIMEOUT_MS must be a number of milliseconds, got {raw:?}"
            ))
        }),
        None => Ok(DEFAULT_BUSY_TIMEOUT_MS),
    }
}

/// Get the actor recorded in change-log entries.
///
/// Priority:
/// 1. Explicit value
/// 2. `SHEETSYNC_ACTOR` environment variable
/// 3. `SYNC`
#[must_use]
pub fn default_actor(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(ToString::to_string)
        .or_else(|| non_empty_env("SHEETSYNC_ACTOR"))
        .unwrap_or_else(|| DEFAULT_CHANGED_BY.to_string())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
