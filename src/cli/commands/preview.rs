//! Preview command implementation.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::config::department;
use crate::error::Result;
use crate::sync::{BatchSyncEngine, read_rows_jsonl};

use super::open_storage;

/// Duplicate keys listed in human output before truncating.
const MAX_LISTED_KEYS: usize = 20;

/// Execute the preview command. Nothing is written, not even table repairs.
///
/// # Errors
///
/// Returns an error if the department, rows file or database cannot be
/// resolved, or the rehearsal fails.
pub fn execute(
    department_slug: &str,
    file: &Path,
    db_path: Option<&PathBuf>,
    busy_timeout_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let profile = department(department_slug)?;
    let rows = read_rows_jsonl(file)?;
    let mut storage = open_storage(db_path, busy_timeout_ms)?;

    let preview = BatchSyncEngine::new(&mut storage).preview(profile, &rows)?;

    if json {
        println!("{}", serde_json::to_string(&preview)?);
        return Ok(());
    }

    println!("Preview for {} (nothing written)", profile.table().bold());
    println!("  {:<14} {}", "would insert", preview.would_insert_count.to_string().green());
    println!("  {:<14} {}", "would skip", preview.would_skip_count.to_string().yellow());
    if preview.rejected_count > 0 {
        println!("  {:<14} {}", "rejected", preview.rejected_count.to_string().red());
    }
    for key in preview.duplicate_keys.iter().take(MAX_LISTED_KEYS) {
        println!("    {}", key.dimmed());
    }
    if preview.duplicate_keys.len() > MAX_LISTED_KEYS {
        println!("    ... and {} more", preview.duplicate_keys.len() - MAX_LISTED_KEYS);
    }

    Ok(())
}
