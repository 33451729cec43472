//! Changelog command implementation.

use std::path::PathBuf;

use chrono::{Local, TimeZone};
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::storage::ChangeLogEntry;
use crate::storage::changelog::entries_for_record;
use crate::storage::schema::schema_for;

use super::open_storage;

#[derive(Serialize)]
struct ChangelogOutput {
    table: String,
    record_id: i64,
    entries: Vec<ChangeLogEntry>,
    count: usize,
}

/// Execute the changelog command.
///
/// # Errors
///
/// Returns an error if the database is missing, the table is not
/// registered, or the query fails.
pub fn execute(
    table: &str,
    record_id: i64,
    limit: u32,
    db_path: Option<&PathBuf>,
    busy_timeout_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let schema = schema_for(table)?;
    let storage = open_storage(db_path, busy_timeout_ms)?;
    let entries = entries_for_record(storage.conn(), schema.table, record_id, Some(limit))?;

    if json {
        let output = ChangelogOutput {
            table: schema.table.to_string(),
            record_id,
            count: entries.len(),
            entries,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No changes recorded for {} #{record_id}", schema.table);
        return Ok(());
    }

    println!("Changes for {} #{record_id}", schema.table.bold());
    for entry in &entries {
        let when = Local
            .timestamp_millis_opt(entry.changed_at)
            .single()
            .map_or_else(|| entry.changed_at.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        println!(
            "  {} {} {} → {} ({})",
            when.dimmed(),
            entry.field_name.bold(),
            entry.old_value.as_deref().unwrap_or("∅").red(),
            entry.new_value.as_deref().unwrap_or("∅").green(),
            entry.changed_by
        );
    }

    Ok(())
}
