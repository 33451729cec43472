//! Input validation.
//!
//! - SQL identifier quoting (names only ever come from allow-lists, quoting
//!   is the last line)
//! - Department slug resolution: exact match → synonym lookup → error
//! - Per-row validation before a row is written

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::model::Row;

// ── Identifiers ──────────────────────────────────────────────

/// Quote a table or column name for splicing into SQL.
///
/// # Errors
///
/// Rejects empty names and names containing control characters.
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() || name.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(format!(
            "invalid identifier: {name:?}"
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

// ── Departments ──────────────────────────────────────────────

pub static VALID_DEPARTMENTS: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["finance", "road-construction"].into_iter().collect());

pub static DEPARTMENT_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("fin", "finance"),
        ("expense", "finance"),
        ("expenses", "finance"),
        ("expend", "finance"),
        ("road", "road-construction"),
        ("roads", "road-construction"),
        ("construction", "road-construction"),
        ("road_construction", "road-construction"),
        ("roadconstruction", "road-construction"),
    ]
    .into_iter()
    .collect()
});

/// Resolve a department slug via exact match or synonym lookup.
///
/// # Errors
///
/// Returns [`Error::UnknownDepartment`] when neither matches.
pub fn normalize_department(input: &str) -> Result<&'static str> {
    let lower = input.trim().to_lowercase();

    if let Some(&slug) = VALID_DEPARTMENTS.get(lower.as_str()) {
        return Ok(slug);
    }

    if let Some(&slug) = DEPARTMENT_SYNONYMS.get(lower.as_str()) {
        return Ok(slug);
    }

    Err(Error::UnknownDepartment {
        slug: input.to_string(),
    })
}

// ── Rows ─────────────────────────────────────────────────────

/// Decides whether a row may be written at all.
///
/// A failure message lands in `BatchResult::errors` and the row is skipped;
/// it never aborts the batch.
pub trait RowValidator {
    /// # Errors
    ///
    /// Returns a human-readable reason when the row must not be written.
    fn validate(&self, row: &Row) -> std::result::Result<(), String>;
}

impl<F> RowValidator for F
where
    F: Fn(&Row) -> std::result::Result<(), String>,
{
    fn validate(&self, row: &Row) -> std::result::Result<(), String> {
        self(row)
    }
}

/// Rejects rows where any of the listed fields is missing or empty.
#[derive(Debug, Clone, Copy)]
pub struct RequiredFields<'a>(pub &'a [&'a str]);

impl RowValidator for RequiredFields<'_> {
    fn validate(&self, row: &Row) -> std::result::Result<(), String> {
        let missing: Vec<&str> = self
            .0
            .iter()
            .copied()
            .filter(|field| row.value(field).is_missing())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required field(s): {}", missing.join(", ")))
        }
    }
}
