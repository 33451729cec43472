//! Composite business keys.
//!
//! Uploaded rows carry no stable identifier, so a record is recognized by a
//! department-specific combination of its fields. A [`KeySpec`] lists those
//! fields in order; [`KeySpec::generate`] normalizes each one and joins them
//! with [`COMPOSITE_KEY_SEPARATOR`].

use std::fmt;

use serde::Serialize;

use super::normalize::{KeyKind, normalize};
use crate::model::Row;

/// Joins key components. Never occurs in business data.
pub const COMPOSITE_KEY_SEPARATOR: &str = "~~~";

/// One component of a composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyField {
    pub name: &'static str,
    pub kind: KeyKind,
    pub required: bool,
    /// Only meaningful on the last field: an upload that fills this field in
    /// still matches a stored record where it was blank.
    pub optional_trailing: bool,
}

impl KeyField {
    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, KeyKind::String)
    }

    #[must_use]
    pub const fn date(name: &'static str) -> Self {
        Self::new(name, KeyKind::Date)
    }

    #[must_use]
    pub const fn decimal(name: &'static str) -> Self {
        Self::new(name, KeyKind::Decimal)
    }

    const fn new(name: &'static str, kind: KeyKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            optional_trailing: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn optional_trailing(mut self) -> Self {
        self.optional_trailing = true;
        self
    }
}

/// An ordered list of key fields. The leading field is always required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeySpec {
    name: &'static str,
    fields: &'static [KeyField],
}

/// Expense forms: one line per form, invoice, day, amount, item and
/// allocation unit.
pub const FINANCE_KEY_SPEC: KeySpec = KeySpec::new(
    "finance",
    &[
        KeyField::string("form_no").required(),
        KeyField::string("invoice_no"),
        KeyField::date("transaction_date"),
        KeyField::decimal("item_amount"),
        KeyField::string("expense_item"),
        KeyField::string("allocation_dept").optional_trailing(),
    ],
);

/// Road works: one line per work order, vendor, item and day.
pub const ROAD_CONSTRUCTION_KEY_SPEC: KeySpec = KeySpec::new(
    "road-construction",
    &[
        KeyField::string("work_order_no").required(),
        KeyField::string("vendor_name"),
        KeyField::string("item_name").required(),
        KeyField::date("work_date").required(),
    ],
);

/// A normalized composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    #[must_use]
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Self {
        let joined: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
        Self(joined.join(COMPOSITE_KEY_SEPARATOR))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized components in field order.
    #[must_use]
    pub fn parts(&self) -> Vec<&str> {
        self.0.split(COMPOSITE_KEY_SEPARATOR).collect()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl KeySpec {
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [KeyField]) -> Self {
        Self { name, fields }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn fields(&self) -> &'static [KeyField] {
        self.fields
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn is_required(&self, index: usize) -> bool {
        index == 0 || self.fields[index].required
    }

    /// Normalized components of `row`, one per field.
    #[must_use]
    pub fn normalized_parts(&self, row: &Row) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| normalize(row.value(f.name), f.kind))
            .collect()
    }

    /// Build the composite key for a row.
    ///
    /// Returns `None` when a required component normalizes to empty, or
    /// when a component contains [`COMPOSITE_KEY_SEPARATOR`] and the key
    /// could not be split back into its fields.
    #[must_use]
    pub fn generate(&self, row: &Row) -> Option<CompositeKey> {
        if self.fields.is_empty() {
            return None;
        }
        let parts = self.normalized_parts(row);
        if parts.iter().enumerate().any(|(i, p)| {
            (p.is_empty() && self.is_required(i)) || p.contains(COMPOSITE_KEY_SEPARATOR)
        }) {
            return None;
        }
        Some(CompositeKey::from_parts(&parts))
    }

    /// Every key under which a row may already be stored, best match first.
    ///
    /// Empty when the row has no usable key.
    #[must_use]
    pub fn variants(&self, row: &Row) -> Vec<CompositeKey> {
        let Some(full) = self.generate(row) else {
            return Vec::new();
        };
        let absent = self.absent_variant(&full);
        std::iter::once(full).chain(absent).collect()
    }

    /// The key with its optional trailing component blanked, when the key
    /// has one and it is filled in.
    #[must_use]
    pub fn absent_variant(&self, key: &CompositeKey) -> Option<CompositeKey> {
        let last = self.fields.last()?;
        if !last.optional_trailing {
            return None;
        }
        let mut parts = key.parts();
        if parts.len() != self.fields.len() || parts.last().is_none_or(|p| p.is_empty()) {
            return None;
        }
        if let Some(tail) = parts.last_mut() {
            *tail = "";
        }
        Some(CompositeKey::from_parts(&parts))
    }

    /// Split a key back into `(field name, normalized component)` pairs.
    ///
    /// Returns `None` when the key has the wrong number of components.
    #[must_use]
    pub fn parse<'k>(&self, key: &'k CompositeKey) -> Option<Vec<(&'static str, &'k str)>> {
        let parts = key.parts();
        if parts.len() != self.fields.len() {
            return None;
        }
        Some(self.fields.iter().map(|f| f.name).zip(parts).collect())
    }

    /// Correct arity and every required component present.
    #[must_use]
    pub fn is_valid(&self, key: &CompositeKey) -> bool {
        self.parse(key).is_some_and(|pairs| {
            pairs
                .iter()
                .enumerate()
                .all(|(i, (_, part))| !part.is_empty() || !self.is_required(i))
        })
    }
}
