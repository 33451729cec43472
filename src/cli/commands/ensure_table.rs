//! Ensure-table command implementation.

use std::path::PathBuf;

use colored::Colorize;

use crate::error::Result;
use crate::sync::BatchSyncEngine;

use super::open_storage;

/// Execute the ensure-table command.
///
/// # Errors
///
/// Returns an error if the database is missing, the table is not
/// registered, or a column cannot be added.
pub fn execute(
    table: &str,
    db_path: Option<&PathBuf>,
    busy_timeout_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db_path, busy_timeout_ms)?;
    let report = BatchSyncEngine::new(&mut storage).ensure_table_structure(table)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    if report.created {
        println!("{} {}", "Created".green(), report.table.bold());
    } else if report.changed() {
        println!("{} {}", "Repaired".yellow(), report.table.bold());
        for column in &report.added_columns {
            println!("  + {column}");
        }
    } else {
        println!("{} is up to date", report.table.bold());
    }
    for column in &report.skipped_columns {
        println!("  {} {column} (cannot be added to an existing table)", "skipped".dimmed());
    }

    Ok(())
}
