//! Import command implementation.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::config::{default_actor, department};
use crate::error::{Error, Result};
use crate::sync::{BatchOptions, BatchResult, BatchSyncEngine, UpsertOptions, read_rows_jsonl};

use super::open_storage;

/// Flags of the import command.
#[derive(Debug, Clone, Copy)]
pub struct ImportArgs<'a> {
    pub department: &'a str,
    pub file: &'a Path,
    pub upsert: bool,
    pub track: &'a [String],
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the department, rows file or database cannot be
/// resolved, or [`Error::BatchFailed`] when the batch rolled back.
pub fn execute(
    args: ImportArgs<'_>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    busy_timeout_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let profile = department(args.department)?;
    let rows = read_rows_jsonl(args.file)?;
    let mut storage = open_storage(db_path, busy_timeout_ms)?;

    let options = if args.upsert {
        BatchOptions::upsert(UpsertOptions {
            tracked_fields: if args.track.is_empty() {
                profile.default_tracked_fields()
            } else {
                args.track.to_vec()
            },
            changed_by: default_actor(actor),
        })
    } else {
        BatchOptions::insert_only()
    };

    let result = BatchSyncEngine::new(&mut storage).import(profile, &rows, &options);

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        print_result(profile.table(), rows.len(), &result);
    }

    if result.success {
        Ok(())
    } else {
        Err(Error::BatchFailed(result.errors.last().cloned().unwrap_or_else(|| {
            "Transaction failed".to_string()
        })))
    }
}

fn print_result(table: &str, rows: usize, result: &BatchResult) {
    if result.success {
        println!("Imported {rows} row(s) into {}", table.bold());
    } else {
        println!("{} nothing was written to {}", "Rolled back:".red().bold(), table.bold());
    }
    println!("  {:<10} {}", "inserted", result.inserted_count.to_string().green());
    if result.updated_count > 0 {
        println!("  {:<10} {}", "updated", result.updated_count.to_string().cyan());
    }
    println!("  {:<10} {}", "skipped", result.skipped_count.to_string().yellow());
    if result.malformed_count > 0 {
        println!("  {:<10} {}", "malformed", result.malformed_count.to_string().yellow());
    }
    if !result.errors.is_empty() {
        println!("  {:<10} {}", "errors", result.errors.len().to_string().red());
        for error in &result.errors {
            println!("    {error}");
        }
    }
}
