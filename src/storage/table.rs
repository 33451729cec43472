//! Destination-table introspection and row writes.
//!
//! [`TableColumns`] is read from `pragma_table_info` once per batch. It is
//! the allow-list for column identifiers and decides how each cell value is
//! converted before it is bound.

use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::trace;

use crate::error::{Error, Result};
use crate::model::{FieldValue, Row};
use crate::storage::schema::{CREATED_AT_COLUMN, UPDATED_AT_COLUMN};
use crate::sync::normalize::{normalize_date, normalize_text, parse_decimal, parse_local_day};
use crate::validate::quote_identifier;

/// Storage class of a column, derived from its declared type the way SQLite
/// derives affinity, with dates split out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Date,
    DateTime,
    Integer,
    Numeric,
}

impl ColumnKind {
    #[must_use]
    pub fn from_declared(decl: &str) -> Self {
        let upper = decl.to_uppercase();
        if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            Self::DateTime
        } else if upper.contains("DATE") {
            Self::Date
        } else if upper.contains("INT") || upper.contains("BIT") || upper.contains("BOOL") {
            Self::Integer
        } else if ["DEC", "NUM", "REAL", "FLOA", "DOUB", "MONEY"]
            .iter()
            .any(|k| upper.contains(k))
        {
            Self::Numeric
        } else {
            Self::Text
        }
    }
}

/// One column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub kind: ColumnKind,
    pub primary_key: bool,
}

/// Actual columns of a table.
#[derive(Debug, Clone)]
pub struct TableColumns {
    table: String,
    quoted_table: String,
    columns: Vec<ColumnInfo>,
}

/// Whether a table exists.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE")?
        .exists([table])?;
    Ok(exists)
}

/// Read the actual column list of `table`.
///
/// # Errors
///
/// Returns [`Error::UnknownTable`] if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<TableColumns> {
    let mut stmt =
        conn.prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| {
            let declared_type: String = row.get(1)?;
            Ok(ColumnInfo {
                name: row.get(0)?,
                kind: ColumnKind::from_declared(&declared_type),
                declared_type,
                primary_key: row.get::<_, i64>(2)? > 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if columns.is_empty() {
        return Err(Error::UnknownTable {
            table: table.to_string(),
        });
    }

    Ok(TableColumns {
        table: table.to_string(),
        quoted_table: quote_identifier(table)?,
        columns,
    })
}

impl TableColumns {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn quoted_table(&self) -> &str {
        &self.quoted_table
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Kind of `name`, `Text` for unknown columns.
    #[must_use]
    pub fn kind(&self, name: &str) -> ColumnKind {
        self.column(name).map_or(ColumnKind::Text, |c| c.kind)
    }

    /// Quote a column name that is known to exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColumn`] for names outside the table.
    pub fn quoted(&self, name: &str) -> Result<String> {
        let column = self.column(name).ok_or_else(|| Error::UnknownColumn {
            table: self.table.clone(),
            column: name.to_string(),
        })?;
        quote_identifier(&column.name)
    }

    /// Whether uploads may set this column: it exists and is neither the
    /// identity nor a managed timestamp.
    #[must_use]
    pub fn is_writable(&self, name: &str) -> bool {
        self.column(name).is_some_and(|c| {
            !c.primary_key
                && !c.name.eq_ignore_ascii_case(CREATED_AT_COLUMN)
                && !c.name.eq_ignore_ascii_case(UPDATED_AT_COLUMN)
        })
    }

    /// Keep only writable fields, collecting the names of the others.
    #[must_use]
    pub fn filter_row(&self, row: &Row, dropped: &mut BTreeSet<String>) -> Row {
        row.iter()
            .filter_map(|(name, value)| {
                if self.is_writable(name) {
                    Some((name.to_string(), value.clone()))
                } else {
                    dropped.insert(name.to_string());
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn has_updated_at(&self) -> bool {
        self.contains(UPDATED_AT_COLUMN)
    }
}

/// Convert a cell value for binding into a column of the given kind.
///
/// Blank text becomes NULL. Dates are stored as `YYYY-MM-DD`; an
/// unparseable date is stored as NULL so it keys the same way it
/// normalizes. Numbers that do not parse are left as text and SQLite's
/// affinity decides.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_sql_value(value: &FieldValue, kind: ColumnKind) -> Value {
    match value {
        FieldValue::Null => return Value::Null,
        FieldValue::Text(s) if s.trim().is_empty() => return Value::Null,
        _ => {}
    }

    match kind {
        ColumnKind::Text => Value::Text(normalize_text(value)),
        ColumnKind::Date => {
            let day = normalize_date(value);
            if day.is_empty() {
                trace!(?value, "Unparseable date stored as NULL");
                Value::Null
            } else {
                Value::Text(day)
            }
        }
        ColumnKind::DateTime => match value {
            FieldValue::Date(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            FieldValue::Number(_) => parse_local_day(value).map_or(Value::Null, |d| {
                Value::Text(format!("{} 00:00:00", d.format("%Y-%m-%d")))
            }),
            _ => Value::Text(normalize_text(value)),
        },
        ColumnKind::Integer => match parse_decimal(value) {
            Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::Integer(n as i64),
            Some(n) => Value::Real(n),
            None => Value::Text(normalize_text(value)),
        },
        ColumnKind::Numeric => {
            parse_decimal(value).map_or_else(|| Value::Text(normalize_text(value)), Value::Real)
        }
    }
}

/// Insert a row whose field names are all known columns. Returns the rowid.
///
/// # Errors
///
/// Returns an error for unknown columns or if the insert fails.
pub fn insert_row(conn: &Connection, columns: &TableColumns, row: &Row) -> Result<i64> {
    let mut names = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, (name, value)) in row.iter().enumerate() {
        names.push(columns.quoted(name)?);
        placeholders.push(format!("?{}", i + 1));
        values.push(to_sql_value(value, columns.kind(name)));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        columns.quoted_table(),
        names.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(conn.last_insert_rowid())
}

/// Update the writable fields of `row` on the record with the given rowid,
/// refreshing `updated_at` when the table has one.
///
/// Returns the number of rows changed (0 when there was nothing to set).
///
/// # Errors
///
/// Returns an error for unknown columns or if the update fails.
pub fn update_row(conn: &Connection, columns: &TableColumns, rowid: i64, row: &Row) -> Result<usize> {
    let mut assignments = Vec::with_capacity(row.len() + 1);
    let mut values = Vec::with_capacity(row.len() + 1);
    for (name, value) in row.iter().filter(|(name, _)| columns.is_writable(name)) {
        values.push(to_sql_value(value, columns.kind(name)));
        assignments.push(format!("{} = ?{}", columns.quoted(name)?, values.len()));
    }
    if assignments.is_empty() {
        return Ok(0);
    }
    if columns.has_updated_at() {
        assignments.push(format!(
            "{} = CURRENT_TIMESTAMP",
            quote_identifier(UPDATED_AT_COLUMN)?
        ));
    }
    values.push(Value::Integer(rowid));

    let sql = format!(
        "UPDATE {} SET {} WHERE rowid = ?{}",
        columns.quoted_table(),
        assignments.join(", "),
        values.len()
    );
    Ok(conn.execute(&sql, params_from_iter(values.iter()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn setup() -> (Connection, TableColumns) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE t (
                "id" INTEGER PRIMARY KEY AUTOINCREMENT,
                "code" TEXT NOT NULL,
                "day" DATE,
                "amount" DECIMAL(18, 2),
                "flag" BIT,
                "created_at" DATETIME DEFAULT CURRENT_TIMESTAMP,
                "updated_at" DATETIME
            )"#,
        )
        .unwrap();
        let columns = table_columns(&conn, "t").unwrap();
        (conn, columns)
    }

    #[test]
    fn test_column_kinds() {
        let (_conn, columns) = setup();
        assert_eq!(columns.kind("code"), ColumnKind::Text);
        assert_eq!(columns.kind("day"), ColumnKind::Date);
        assert_eq!(columns.kind("amount"), ColumnKind::Numeric);
        assert_eq!(columns.kind("flag"), ColumnKind::Integer);
        assert_eq!(columns.kind("created_at"), ColumnKind::DateTime);
        assert!(columns.column("id").unwrap().primary_key);
    }

    #[test]
    fn test_unknown_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            table_columns(&conn, "nope"),
            Err(Error::UnknownTable { .. })
        ));
        assert!(!table_exists(&conn, "nope").unwrap());
    }

    #[test]
    fn test_filter_row_drops_unknown_and_managed_columns() {
        let (_conn, columns) = setup();
        let row = Row::new()
            .with("id", 99.0)
            .with("code", "A")
            .with("bogus", "x")
            .with("created_at", "2020-01-01");
        let mut dropped = BTreeSet::new();
        let filtered = columns.filter_row(&row, &mut dropped);
        assert_eq!(filtered.names().collect::<Vec<_>>(), vec!["code"]);
        assert_eq!(
            dropped.into_iter().collect::<Vec<_>>(),
            vec!["bogus", "created_at", "id"]
        );
    }

    #[test]
    fn test_quoted_rejects_unknown_columns() {
        let (_conn, columns) = setup();
        assert_eq!(columns.quoted("CODE").unwrap(), "\"code\"");
        assert!(matches!(
            columns.quoted("code; DROP TABLE t"),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_insert_converts_values_by_column_kind() {
        let (conn, columns) = setup();
        let row = Row::new()
            .with("code", " A1 ")
            .with("day", "01/15/2026")
            .with("amount", "1,234.50")
            .with("flag", FieldValue::Number(1.0));
        let id = insert_row(&conn, &columns, &row).unwrap();

        let (code, day, amount, flag): (String, String, f64, i64) = conn
            .query_row(
                "SELECT code, day, amount, flag FROM t WHERE id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(code, "A1");
        assert_eq!(day, "2026-01-15");
        assert!((amount - 1234.5).abs() < 1e-9);
        assert_eq!(flag, 1);
    }

    #[test]
    fn test_blank_and_bad_dates_become_null() {
        assert_eq!(to_sql_value(&FieldValue::from("  "), ColumnKind::Text), Value::Null);
        assert_eq!(to_sql_value(&FieldValue::from("N/A"), ColumnKind::Date), Value::Null);
        let day = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(
            to_sql_value(&FieldValue::from(day), ColumnKind::DateTime),
            Value::Text("2026-01-15 00:00:00".to_string())
        );
        assert_eq!(
            to_sql_value(&FieldValue::Number(100.0), ColumnKind::Text),
            Value::Text("100".to_string())
        );
    }

    #[test]
    fn test_update_skips_identity_and_refreshes_updated_at() {
        let (conn, columns) = setup();
        let id = insert_row(&conn, &columns, &Row::new().with("code", "A")).unwrap();

        let changed = update_row(
            &conn,
            &columns,
            id,
            &Row::new().with("id", 500.0).with("code", "B").with("amount", 2.5),
        )
        .unwrap();
        assert_eq!(changed, 1);

        let (rowid, code, updated_at): (i64, String, Option<String>) = conn
            .query_row("SELECT id, code, updated_at FROM t", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!(rowid, id);
        assert_eq!(code, "B");
        assert!(updated_at.is_some());

        assert_eq!(update_row(&conn, &columns, id, &Row::new().with("id", 1.0)).unwrap(), 0);
    }
}
