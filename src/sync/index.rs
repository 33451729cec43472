//! Existing-record lookup.
//!
//! Answers "which of these keys are already stored?" for a whole upload with
//! as few statements as possible. Each key becomes one predicate that
//! normalizes the stored columns the same way [`super::normalize`] normalizes
//! incoming values; predicates are OR-ed together and sent in chunks of
//! [`KEY_CHUNK_SIZE`] to stay under SQLite's bound-parameter limit. Matching
//! rows are re-keyed with the generator, so the returned keys are exactly the
//! ones the engine will look up.

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use super::key::{CompositeKey, KeySpec};
use super::normalize::KeyKind;
use crate::error::{Error, Result};
use crate::model::{FieldValue, Row};
use crate::storage::table::TableColumns;

/// Keys per lookup statement.
pub const KEY_CHUNK_SIZE: usize = 1000;

/// A stored record as read back for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// SQLite rowid (the identity column for the canonical tables).
    pub id: i64,
    pub row: Row,
}

/// Keys already stored, optionally with their records.
///
/// Built once per call and extended as the call inserts rows; never cached
/// across calls.
#[derive(Debug, Clone)]
pub enum ExistingIndex {
    Presence(HashSet<CompositeKey>),
    Snapshot(HashMap<CompositeKey, StoredRecord>),
}

impl ExistingIndex {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Presence(keys) => keys.len(),
            Self::Snapshot(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, key: &CompositeKey) -> bool {
        match self {
            Self::Presence(keys) => keys.contains(key),
            Self::Snapshot(records) => records.contains_key(key),
        }
    }

    /// First variant that is already stored.
    #[must_use]
    pub fn find<'k>(&self, variants: &'k [CompositeKey]) -> Option<&'k CompositeKey> {
        variants.iter().find(|k| self.contains(k))
    }

    /// The stored record, for snapshot indexes.
    #[must_use]
    pub fn record(&self, key: &CompositeKey) -> Option<&StoredRecord> {
        match self {
            Self::Presence(_) => None,
            Self::Snapshot(records) => records.get(key),
        }
    }

    #[must_use]
    pub fn has_snapshots(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }

    /// Register a record written during this call. Snapshot indexes keep a
    /// copy of `row` for later comparisons.
    pub fn remember(&mut self, key: CompositeKey, id: i64, row: &Row) {
        match self {
            Self::Presence(keys) => {
                keys.insert(key);
            }
            Self::Snapshot(records) => {
                records.insert(key, StoredRecord { id, row: row.clone() });
            }
        }
    }
}

/// Strategy for building the index of stored keys.
pub trait ExistingChecker {
    /// # Errors
    ///
    /// Returns an error if a lookup statement fails.
    fn check(
        &self,
        conn: &Connection,
        keys: &[CompositeKey],
        columns: &TableColumns,
        spec: &KeySpec,
    ) -> Result<ExistingIndex>;
}

/// Key presence only. Enough for insert-only imports.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceCheck;

/// Keys with full stored records, for upserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCheck;

impl ExistingChecker for PresenceCheck {
    fn check(
        &self,
        conn: &Connection,
        keys: &[CompositeKey],
        columns: &TableColumns,
        spec: &KeySpec,
    ) -> Result<ExistingIndex> {
        batch_query_keys(conn, keys, columns, spec).map(ExistingIndex::Presence)
    }
}

impl ExistingChecker for SnapshotCheck {
    fn check(
        &self,
        conn: &Connection,
        keys: &[CompositeKey],
        columns: &TableColumns,
        spec: &KeySpec,
    ) -> Result<ExistingIndex> {
        batch_query_data(conn, keys, columns, spec).map(ExistingIndex::Snapshot)
    }
}

/// Which of `keys` are stored in the table.
///
/// # Errors
///
/// Returns an error for malformed keys, key fields missing from the table,
/// or a failed statement.
pub fn batch_query_keys(
    conn: &Connection,
    keys: &[CompositeKey],
    columns: &TableColumns,
    spec: &KeySpec,
) -> Result<HashSet<CompositeKey>> {
    query_keys_chunked(conn, keys, columns, spec, KEY_CHUNK_SIZE)
}

/// Stored records for `keys`, keyed by their regenerated composite key.
///
/// # Errors
///
/// Same as [`batch_query_keys`].
pub fn batch_query_data(
    conn: &Connection,
    keys: &[CompositeKey],
    columns: &TableColumns,
    spec: &KeySpec,
) -> Result<HashMap<CompositeKey, StoredRecord>> {
    query_data_chunked(conn, keys, columns, spec, KEY_CHUNK_SIZE)
}

pub(crate) fn query_keys_chunked(
    conn: &Connection,
    keys: &[CompositeKey],
    columns: &TableColumns,
    spec: &KeySpec,
    chunk_size: usize,
) -> Result<HashSet<CompositeKey>> {
    let select = spec
        .fields()
        .iter()
        .map(|f| columns.quoted(f.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut found = HashSet::new();
    for_each_match(conn, keys, columns, spec, chunk_size, &select, |row| {
        if let Some(key) = spec.generate(&row) {
            found.insert(key);
        }
    })?;
    Ok(found)
}

pub(crate) fn query_data_chunked(
    conn: &Connection,
    keys: &[CompositeKey],
    columns: &TableColumns,
    spec: &KeySpec,
    chunk_size: usize,
) -> Result<HashMap<CompositeKey, StoredRecord>> {
    let mut found = HashMap::new();
    for_each_match(conn, keys, columns, spec, chunk_size, "rowid AS __rowid, *", |mut row| {
        let Some(FieldValue::Number(id)) = row.get("__rowid").cloned() else {
            return;
        };
        row = row
            .iter()
            .filter(|(name, _)| *name != "__rowid")
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        if let Some(key) = spec.generate(&row) {
            #[allow(clippy::cast_possible_truncation)]
            found.insert(key, StoredRecord { id: id as i64, row });
        }
    })?;
    Ok(found)
}

/// Run the chunked lookup, handing every matching row to `on_row`.
fn for_each_match<F>(
    conn: &Connection,
    keys: &[CompositeKey],
    columns: &TableColumns,
    spec: &KeySpec,
    chunk_size: usize,
    select: &str,
    mut on_row: F,
) -> Result<()>
where
    F: FnMut(Row),
{
    let mut seen = HashSet::with_capacity(keys.len());
    let unique: Vec<&CompositeKey> = keys.iter().filter(|k| seen.insert(*k)).collect();
    if unique.is_empty() {
        return Ok(());
    }

    let quoted_fields = spec
        .fields()
        .iter()
        .map(|f| Ok((columns.quoted(f.name)?, f.kind)))
        .collect::<Result<Vec<_>>>()?;

    for (n, chunk) in unique.chunks(chunk_size.max(1)).enumerate() {
        let mut params: Vec<String> = Vec::with_capacity(chunk.len() * quoted_fields.len());
        let mut predicates = Vec::with_capacity(chunk.len());
        for key in chunk {
            predicates.push(key_predicate(key, spec, &quoted_fields, &mut params)?);
        }

        let sql = format!(
            "SELECT {select} FROM {} WHERE {}",
            columns.quoted_table(),
            any_of(&predicates)
        );
        debug!(table = columns.table(), chunk = n, keys = chunk.len(), "Querying existing keys");

        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while let Some(r) = rows.next()? {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                row.set(name, r.get::<_, FieldValue>(i)?);
            }
            on_row(row);
        }
    }
    Ok(())
}

/// Half-width of the amount range a decimal key component selects. Wider
/// than half a cent so float noise in stored values stays inside it.
const DECIMAL_WINDOW: f64 = 0.01;

/// `(f1 AND f2 AND ...)` for one key, pushing its parameters.
fn key_predicate(
    key: &CompositeKey,
    spec: &KeySpec,
    fields: &[(String, KeyKind)],
    params: &mut Vec<String>,
) -> Result<String> {
    let parts = key.parts();
    if parts.len() != fields.len() {
        return Err(Error::InvalidArgument(format!(
            "key '{key}' does not match the {} key layout",
            spec.name()
        )));
    }

    let mut clauses = Vec::with_capacity(fields.len());
    for ((column, kind), part) in fields.iter().zip(parts) {
        params.push(part.to_string());
        let p = params.len();
        clauses.push(match kind {
            KeyKind::String => format!("IFNULL(TRIM({column}), '') = ?{p}"),
            KeyKind::Date => format!("IFNULL(substr({column}, 1, 10), '') = ?{p}"),
            // SQLite's ROUND disagrees with `format_cents` on half-cent ties,
            // so only narrow to the neighbourhood here. The exact match is
            // made by regenerating the key of every returned row.
            KeyKind::Decimal => format!(
                "ABS(CAST(IFNULL({column}, 0) AS REAL) - CAST(?{p} AS REAL)) < {DECIMAL_WINDOW}"
            ),
        });
    }
    Ok(format!("({})", clauses.join(" AND ")))
}

/// OR the predicates as a balanced tree so expression depth stays
/// logarithmic in the chunk size.
fn any_of(predicates: &[String]) -> String {
    match predicates {
        [] => "0".to_string(),
        [single] => single.clone(),
        _ => {
            let (left, right) = predicates.split_at(predicates.len() / 2);
            format!("({} OR {})", any_of(left), any_of(right))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::ensure_table_structure;
    use crate::storage::schema::EXPEND_FORM_SCHEMA;
    use crate::storage::table::{insert_row, table_columns};
    use crate::sync::key::FINANCE_KEY_SPEC;

    fn setup() -> (Connection, TableColumns) {
        let conn = Connection::open_in_memory().unwrap();
        ensure_table_structure(&conn, &EXPEND_FORM_SCHEMA).unwrap();
        let columns = table_columns(&conn, "expend_form").unwrap();
        (conn, columns)
    }

    fn form(no: &str) -> Row {
        Row::new()
            .with("form_no", no)
            .with("invoice_no", "I1")
            .with("transaction_date", "2026-01-15")
            .with("item_amount", 100.5)
            .with("expense_item", "Travel")
            .with("allocation_dept", "A")
    }

    #[test]
    fn test_stored_representations_key_like_incoming_rows() {
        let (conn, columns) = setup();
        // Legacy writer: padded text, timestamped date, amount as text
        conn.execute(
            "INSERT INTO expend_form (form_no, invoice_no, transaction_date, item_amount, expense_item, allocation_dept)
             VALUES (' F1 ', 'I1', '2026-01-15 00:00:00', '100.5', 'Travel', 'A')",
            [],
        )
        .unwrap();

        let key = FINANCE_KEY_SPEC.generate(&form("F1")).unwrap();
        let found = batch_query_keys(&conn, &[key.clone()], &columns, &FINANCE_KEY_SPEC).unwrap();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![key]);
    }

    #[test]
    fn test_null_and_blank_optional_fields_match_empty_component() {
        let (conn, columns) = setup();
        insert_row(&conn, &columns, &form("F1").with("invoice_no", "").with("allocation_dept", FieldValue::Null))
            .unwrap();

        let row = form("F1").with("invoice_no", FieldValue::Null);
        let variants = FINANCE_KEY_SPEC.variants(&row);
        let found = batch_query_keys(&conn, &variants, &columns, &FINANCE_KEY_SPEC).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains(&variants[1]));
    }

    #[test]
    fn test_batch_query_data_returns_records() {
        let (conn, columns) = setup();
        let id = insert_row(&conn, &columns, &form("F1").with("payment_status", "Pending")).unwrap();

        let key = FINANCE_KEY_SPEC.generate(&form("F1")).unwrap();
        let found = batch_query_data(&conn, &[key.clone()], &columns, &FINANCE_KEY_SPEC).unwrap();
        let record = &found[&key];
        assert_eq!(record.id, id);
        assert_eq!(record.row.value("payment_status"), &FieldValue::from("Pending"));
        assert!(!record.row.contains("__rowid"));
    }

    #[test]
    fn test_chunking_is_lossless() {
        let (conn, columns) = setup();
        for i in 0..1800 {
            insert_row(&conn, &columns, &form(&format!("F{i}"))).unwrap();
        }

        let keys: Vec<CompositeKey> = (0..2500)
            .map(|i| FINANCE_KEY_SPEC.generate(&form(&format!("F{i}"))).unwrap())
            .collect();

        let chunked = batch_query_keys(&conn, &keys, &columns, &FINANCE_KEY_SPEC).unwrap();
        let unbounded =
            query_keys_chunked(&conn, &keys, &columns, &FINANCE_KEY_SPEC, usize::MAX).unwrap();
        assert_eq!(chunked.len(), 1800);
        assert_eq!(chunked, unbounded);

        let records = query_data_chunked(&conn, &keys, &columns, &FINANCE_KEY_SPEC, 7).unwrap();
        assert_eq!(records.len(), 1800);
    }

    #[test]
    fn test_empty_key_set_issues_no_query() {
        let (conn, columns) = setup();
        assert!(batch_query_keys(&conn, &[], &columns, &FINANCE_KEY_SPEC).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_key_is_rejected() {
        let (conn, columns) = setup();
        let bad = CompositeKey::from_parts(&["F1", "I1"]);
        assert!(batch_query_keys(&conn, &[bad], &columns, &FINANCE_KEY_SPEC).is_err());
    }

    #[test]
    fn test_any_of_is_balanced() {
        let preds: Vec<String> = (0..4).map(|i| format!("p{i}")).collect();
        assert_eq!(any_of(&preds), "((p0 OR p1) OR (p2 OR p3))");
        assert_eq!(any_of(&preds[..1]), "p0");
    }
}
