//! Initialize the sheetsync database.
//!
//! Creates the database file (and its parent directories), applies the
//! bookkeeping schema and creates or repairs every registered destination
//! table. Running it again is harmless: existing tables are only repaired.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::resolve_busy_timeout;
use crate::error::Result;
use crate::storage::MigrationReport;
use crate::storage::SqliteStorage;
use crate::storage::schema::REGISTERED_SCHEMAS;
use crate::sync::BatchSyncEngine;

use super::database_path;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    tables: Vec<MigrationReport>,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created, or a
/// table cannot be repaired.
pub fn execute(db_path: Option<&PathBuf>, busy_timeout_ms: Option<u64>, json: bool) -> Result<()> {
    let path = database_path(db_path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let timeout = resolve_busy_timeout(busy_timeout_ms)?;
    let mut storage = SqliteStorage::open_with_timeout(&path, Some(timeout))?;
    let mut engine = BatchSyncEngine::new(&mut storage);
    let tables = REGISTERED_SCHEMAS
        .iter()
        .map(|schema| engine.ensure_table_structure(schema.table))
        .collect::<Result<Vec<_>>>()?;

    if json {
        let output = InitOutput {
            database: path,
            tables,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized sheetsync database");
        println!("  Database: {}", path.display());
        for report in &tables {
            let state = if report.created {
                "created"
            } else if report.added_columns.is_empty() {
                "up to date"
            } else {
                "repaired"
            };
            println!("  Table {}: {state}", report.table);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_nested_database() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("nested").join("sheetsync.db");

        execute(Some(&db), None, true).unwrap();
        assert!(db.exists());

        let storage = SqliteStorage::open(&db).unwrap();
        let tables: i64 = storage
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('expend_form', 'road_construction_form', 'change_log')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("sheetsync.db");
        execute(Some(&db), None, true).unwrap();
        execute(Some(&db), None, true).unwrap();
    }
}
