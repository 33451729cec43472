//! Field-level change detection for upserts.

use std::collections::HashMap;

use super::normalize::{normalize_text, parse_decimal, parse_local_day};
use crate::model::{FieldValue, Row, format_number};
use crate::storage::changelog::ChangeLogEntry;
use crate::storage::table::{ColumnKind, TableColumns};

/// Fields the finance upsert audits when the caller names none.
pub const DEFAULT_TRACKED_FIELDS: &[&str] = &["payment_status", "actual_payment_date"];

/// Actor recorded when the caller names none.
pub const DEFAULT_CHANGED_BY: &str = "SYNC";

/// How two values of a tracked field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Trimmed text.
    Text,
    /// Local calendar day, falling back to text when either side is not a
    /// date.
    Date,
    /// Numeric value, falling back to text when either side is not a
    /// number.
    Number,
}

impl From<ColumnKind> for Comparison {
    fn from(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Date | ColumnKind::DateTime => Self::Date,
            ColumnKind::Integer | ColumnKind::Numeric => Self::Number,
            ColumnKind::Text => Self::Text,
        }
    }
}

/// Compares a stored record with an incoming row on a fixed set of fields.
#[derive(Debug, Clone)]
pub struct ChangeTracker<'a> {
    table: &'a str,
    tracked: Vec<&'a str>,
    changed_by: &'a str,
    comparisons: HashMap<String, Comparison>,
}

impl<'a> ChangeTracker<'a> {
    #[must_use]
    pub fn new(table: &'a str, tracked: &'a [String], changed_by: &'a str) -> Self {
        Self {
            table,
            tracked: tracked.iter().map(String::as_str).collect(),
            changed_by,
            comparisons: HashMap::new(),
        }
    }

    /// Compare each tracked field according to its column type.
    #[must_use]
    pub fn with_columns(mut self, columns: &TableColumns) -> Self {
        for field in &self.tracked {
            if let Some(column) = columns.column(field) {
                self.comparisons
                    .insert(field.to_lowercase(), column.kind.into());
            }
        }
        self
    }

    fn comparison(&self, field: &str, old: &FieldValue, new: &FieldValue) -> Comparison {
        if let Some(c) = self.comparisons.get(&field.to_lowercase()) {
            return *c;
        }
        if matches!(old, FieldValue::Date(_)) || matches!(new, FieldValue::Date(_)) {
            Comparison::Date
        } else {
            Comparison::Text
        }
    }

    /// One entry per tracked field whose value differs.
    ///
    /// Fields missing from `incoming` are not compared: an upload without a
    /// column cannot clear it.
    #[must_use]
    pub fn diff(&self, record_id: i64, existing: &Row, incoming: &Row) -> Vec<ChangeLogEntry> {
        self.tracked
            .iter()
            .filter_map(|field| {
                let new = incoming.get(field)?;
                let old = existing.value(field);
                let comparison = self.comparison(field, old, new);
                if comparable(old, comparison) == comparable(new, comparison) {
                    return None;
                }
                Some(
                    ChangeLogEntry::new(self.table, record_id, field, self.changed_by)
                        .with_values(old.display_value(), new.display_value()),
                )
            })
            .collect()
    }
}

/// Compare without column information: dates by local day, everything else
/// as trimmed text.
#[must_use]
pub fn diff_and_log(
    table: &str,
    record_id: i64,
    existing: &Row,
    incoming: &Row,
    tracked_fields: &[String],
    changed_by: &str,
) -> Vec<ChangeLogEntry> {
    ChangeTracker::new(table, tracked_fields, changed_by).diff(record_id, existing, incoming)
}

fn comparable(value: &FieldValue, comparison: Comparison) -> String {
    let text = || normalize_text(value);
    match comparison {
        Comparison::Text => text(),
        Comparison::Date => parse_local_day(value)
            .map_or_else(text, |d| d.format("%Y-%m-%d").to_string()),
        Comparison::Number => parse_decimal(value).map_or_else(text, format_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tracked() -> Vec<String> {
        DEFAULT_TRACKED_FIELDS.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_change_produces_one_entry() {
        let fields = tracked();
        let existing = Row::new().with("payment_status", "Pending");
        let incoming = Row::new().with("payment_status", "Paid");

        let entries = diff_and_log("expend_form", 3, &existing, &incoming, &fields, "alice");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_name, "payment_status");
        assert_eq!(entries[0].old_value.as_deref(), Some("Pending"));
        assert_eq!(entries[0].new_value.as_deref(), Some("Paid"));
        assert_eq!(entries[0].changed_by, "alice");
        assert_eq!(entries[0].record_id, 3);
    }

    #[test]
    fn test_same_value_produces_nothing() {
        let fields = tracked();
        let existing = Row::new().with("payment_status", "Paid ");
        let incoming = Row::new().with("payment_status", " Paid");
        assert!(diff_and_log("t", 1, &existing, &incoming, &fields, "SYNC").is_empty());
    }

    #[test]
    fn test_date_representations_are_not_changes() {
        let fields = tracked();
        let existing = Row::new().with("actual_payment_date", "2026-01-15");
        let incoming =
            Row::new().with("actual_payment_date", NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        assert!(diff_and_log("t", 1, &existing, &incoming, &fields, "SYNC").is_empty());

        let later =
            Row::new().with("actual_payment_date", NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
        let entries = diff_and_log("t", 1, &existing, &later, &fields, "SYNC");
        assert_eq!(entries[0].new_value.as_deref(), Some("2026-01-16"));
    }

    #[test]
    fn test_untracked_and_absent_fields_are_ignored() {
        let fields = tracked();
        let existing = Row::new().with("payment_status", "Pending").with("remark", "a");
        let incoming = Row::new().with("remark", "b");
        assert!(diff_and_log("t", 1, &existing, &incoming, &fields, "SYNC").is_empty());
    }

    #[test]
    fn test_numeric_columns_compare_by_value() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, amount DECIMAL(18, 2), due DATE)")
            .unwrap();
        let columns = crate::storage::table::table_columns(&conn, "t").unwrap();
        let fields = vec!["amount".to_string(), "due".to_string()];
        let tracker = ChangeTracker::new("t", &fields, "SYNC").with_columns(&columns);

        let existing = Row::new().with("amount", 100.5).with("due", "2026-01-15");
        let incoming = Row::new().with("amount", "100.50").with("due", "01/15/2026");
        assert!(tracker.diff(1, &existing, &incoming).is_empty());

        let cleared = Row::new().with("amount", FieldValue::Null);
        let entries = tracker.diff(1, &existing, &cleared);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].old_value.as_deref(), Some("100.5"));
        assert_eq!(entries[0].new_value, None);
    }
}
