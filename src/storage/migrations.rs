//! Schema drift repair for destination tables.
//!
//! Destination tables are shared with other tooling and tend to lag behind
//! the canonical schema. Before every write the migrator creates a missing
//! table or adds the columns an existing one lacks. It never drops, renames
//! or retypes anything, and it is idempotent: running it twice is the same
//! as running it once.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::storage::schema::CanonicalSchema;
use crate::storage::table::{table_columns, table_exists};
use crate::validate::quote_identifier;

/// What a run of [`ensure_table_structure`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub table: String,
    pub created: bool,
    pub added_columns: Vec<String>,
    /// Missing columns that `ADD COLUMN` cannot express (keys, identity,
    /// uniqueness, non-constant defaults).
    pub skipped_columns: Vec<String>,
}

impl MigrationReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created || !self.added_columns.is_empty()
    }
}

/// Make `schema.table` exist with at least the canonical columns.
///
/// Runs on whatever connection or transaction it is given; inside a
/// transaction the DDL commits or rolls back with it.
///
/// # Errors
///
/// Returns [`Error::Migration`] naming the column when an `ADD COLUMN`
/// fails, or a database error if creation or introspection fails.
pub fn ensure_table_structure(conn: &Connection, schema: &CanonicalSchema) -> Result<MigrationReport> {
    let mut report = MigrationReport {
        table: schema.table.to_string(),
        ..MigrationReport::default()
    };

    if !table_exists(conn, schema.table)? {
        info!(table = schema.table, "Creating table from canonical schema");
        conn.execute_batch(&schema.create_sql()?)?;
        report.created = true;
        return Ok(report);
    }

    let existing: HashSet<String> = table_columns(conn, schema.table)?
        .iter()
        .map(|c| c.name.to_lowercase())
        .collect();

    let missing: Vec<_> = schema
        .columns()
        .into_iter()
        .filter(|c| !existing.contains(&c.name.to_lowercase()))
        .collect();

    if missing.is_empty() {
        debug!(table = schema.table, "Table structure up to date");
        return Ok(report);
    }

    let quoted_table = quote_identifier(schema.table)?;
    for column in missing {
        if !column.is_retrofittable() {
            warn!(
                table = schema.table,
                column = %column.name,
                "Column cannot be added to an existing table, skipping"
            );
            report.skipped_columns.push(column.name);
            continue;
        }

        info!(table = schema.table, column = %column.name, "Adding missing column");
        let sql = format!("ALTER TABLE {quoted_table} ADD COLUMN {}", column.definition);
        if let Err(e) = conn.execute_batch(&sql) {
            // Another writer may have added it since we looked.
            if e.to_string().contains("duplicate column name") {
                warn!(
                    table = schema.table,
                    column = %column.name,
                    "Column appeared concurrently, treating as added"
                );
                continue;
            }
            error!(table = schema.table, column = %column.name, error = %e, "Column add failed");
            return Err(Error::Migration {
                table: schema.table.to_string(),
                column: column.name,
                source: e,
            });
        }
        report.added_columns.push(column.name);
    }

    info!(
        table = schema.table,
        added = report.added_columns.len(),
        skipped = report.skipped_columns.len(),
        "Table structure repaired"
    );
    Ok(report)
}
