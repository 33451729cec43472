//! Change-log storage and retrieval.
//!
//! One row per changed tracked field per upserted record. Entries are only
//! ever appended; the engine writes them inside the same transaction as the
//! update they describe.

use rusqlite::{Connection, Result};
use serde::Serialize;

/// Kind of change recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Update,
}

impl ChangeType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
        }
    }
}

/// A single audited field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Unix milliseconds.
    pub changed_at: i64,
    pub changed_by: String,
    pub change_type: ChangeType,
}

impl ChangeLogEntry {
    /// Create a new entry (id will be assigned by database).
    #[must_use]
    pub fn new(table_name: &str, record_id: i64, field_name: &str, changed_by: &str) -> Self {
        Self {
            id: 0,
            table_name: table_name.to_string(),
            record_id,
            field_name: field_name.to_string(),
            old_value: None,
            new_value: None,
            changed_at: chrono::Utc::now().timestamp_millis(),
            changed_by: changed_by.to_string(),
            change_type: ChangeType::Update,
        }
    }

    /// Add old/new values.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }
}

/// Insert an entry into the change log.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_entry(conn: &Connection, entry: &ChangeLogEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO change_log (table_name, record_id, field_name, old_value, new_value, changed_at, changed_by, change_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            entry.table_name,
            entry.record_id,
            entry.field_name,
            entry.old_value,
            entry.new_value,
            entry.changed_at,
            entry.changed_by,
            entry.change_type.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Entries for one record, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn entries_for_record(
    conn: &Connection,
    table_name: &str,
    record_id: i64,
    limit: Option<u32>,
) -> Result<Vec<ChangeLogEntry>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT log_id, table_name, record_id, field_name, old_value, new_value, changed_at, changed_by
         FROM change_log
         WHERE table_name = ?1 AND record_id = ?2
         ORDER BY changed_at DESC, log_id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![table_name, record_id, limit], |row| {
        Ok(ChangeLogEntry {
            id: row.get(0)?,
            table_name: row.get(1)?,
            record_id: row.get(2)?,
            field_name: row.get(3)?,
            old_value: row.get(4)?,
            new_value: row.get(5)?,
            changed_at: row.get(6)?,
            changed_by: row.get(7)?,
            change_type: ChangeType::Update,
        })
    })?;

    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_entry_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let entry = ChangeLogEntry::new("expend_form", 7, "payment_status", "SYNC")
            .with_values(Some("Pending".to_string()), Some("Paid".to_string()));
        let id = insert_entry(&conn, &entry).unwrap();
        assert!(id > 0);

        let entries = entries_for_record(&conn, "expend_form", 7, Some(10)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].changed_by, "SYNC");
        assert_eq!(entries[0].old_value.as_deref(), Some("Pending"));
        assert_eq!(entries[0].new_value.as_deref(), Some("Paid"));

        let stored: String = conn
            .query_row("SELECT change_type FROM change_log WHERE log_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "UPDATE");

        assert!(entries_for_record(&conn, "expend_form", 8, None).unwrap().is_empty());
    }
}
