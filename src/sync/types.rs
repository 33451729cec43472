//! Result and option types for batch synchronization.

use serde::Serialize;

use super::tracker::{DEFAULT_CHANGED_BY, DEFAULT_TRACKED_FIELDS};

/// Outcome of one batch call. Not persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Whether the transaction committed.
    pub success: bool,
    /// Number of new records written.
    pub inserted_count: usize,
    /// Number of existing records updated (upsert mode only).
    pub updated_count: usize,
    /// Rows whose key was already stored, or that lost a uniqueness race.
    pub skipped_count: usize,
    /// Rows without a usable composite key.
    pub malformed_count: usize,
    /// One message per rejected row, or a single `Transaction failed: ..`
    /// when the batch rolled back.
    pub errors: Vec<String>,
}

impl BatchResult {
    /// Rows accounted for by the counters and error list.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted_count
            + self.updated_count
            + self.skipped_count
            + self.malformed_count
            + self.errors.len()
    }
}

/// What a batch would do, computed without writing anything.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewResult {
    pub would_insert_count: usize,
    pub would_skip_count: usize,
    /// Keys of the rows that would be skipped, in row order.
    pub duplicate_keys: Vec<String>,
    /// Rows that fail validation or have no usable key.
    pub rejected_count: usize,
}

/// Upsert settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOptions {
    pub tracked_fields: Vec<String>,
    pub changed_by: String,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            tracked_fields: DEFAULT_TRACKED_FIELDS.iter().map(ToString::to_string).collect(),
            changed_by: DEFAULT_CHANGED_BY.to_string(),
        }
    }
}

/// Options for a department batch call. `upsert: None` is insert-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub upsert: Option<UpsertOptions>,
}

impl BatchOptions {
    #[must_use]
    pub fn insert_only() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn upsert(options: UpsertOptions) -> Self {
        Self {
            upsert: Some(options),
        }
    }
}
