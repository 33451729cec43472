//! Row model.
//!
//! A [`Row`] is what the external spreadsheet parser hands over: field
//! names in column order, each with a loosely typed [`FieldValue`]. The same
//! logical value can arrive as a native date, a formatted string or a
//! spreadsheet serial number; the sync layer normalizes those, this module
//! only carries them.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use rusqlite::types::{FromSql, FromSqlResult, ValueRef};
use serde::{Deserialize, Deserializer};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    Number(f64),
    /// Local wall-clock timestamp.
    Date(NaiveDateTime),
}

static NULL: FieldValue = FieldValue::Null;

impl FieldValue {
    /// True for `Null` and for the empty string.
    ///
    /// Whitespace-only text is *not* missing here; callers that care trim
    /// through the normalizer.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) | Self::Date(_) => false,
        }
    }

    /// Human-readable rendering used in audit entries.
    ///
    /// Dates at midnight print as `YYYY-MM-DD`, other dates include the
    /// time. Blank text and `Null` render as `None`.
    #[must_use]
    pub fn display_value(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Number(n) => Some(format_number(*n)),
            Self::Date(dt) => Some(if dt.time() == NaiveTime::MIN {
                dt.format("%Y-%m-%d").to_string()
            } else {
                dt.format("%Y-%m-%d %H:%M:%S").to_string()
            }),
        }
    }

    /// Build a value from a JSON scalar.
    ///
    /// Booleans become `1`/`0`. Arrays and objects have no cell equivalent
    /// and are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Number(if b { 1.0 } else { 0.0 })),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| format!("number {n} is out of range")),
            Value::String(s) => Ok(Self::Text(s)),
            Value::Array(_) => Err("arrays are not cell values".to_string()),
            Value::Object(_) => Err("nested objects are not cell values".to_string()),
        }
    }
}

/// Render a number without a trailing `.0` when it is integral.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FieldValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d.and_time(NaiveTime::MIN))
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(dt: NaiveDateTime) -> Self {
        Self::Date(dt)
    }
}

/// Zoned instants are pinned to the local wall clock, never to UTC, so the
/// calendar day a user typed in the spreadsheet survives.
impl<Tz: TimeZone> From<DateTime<Tz>> for FieldValue {
    fn from(dt: DateTime<Tz>) -> Self {
        let local = dt.with_timezone(&Local).naive_local();
        Self::Date(local.with_nanosecond(0).unwrap_or(local))
    }
}

impl FromSql for FieldValue {
    #[allow(clippy::cast_precision_loss)]
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Number(i as f64),
            ValueRef::Real(f) => Self::Number(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Self::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}

// ── Row ──────────────────────────────────────────────────────

/// One spreadsheet row: field names in column order with their values.
///
/// Setting an existing field replaces its value in place, so the original
/// column order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, FieldValue)>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Like [`Row::get`] but absent fields read as `Null`.
    #[must_use]
    pub fn value(&self, name: &str) -> &FieldValue {
        self.get(name).unwrap_or(&NULL)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Overlay every field of `other` onto this row.
    pub fn merge(&mut self, other: &Row) {
        for (name, value) in other.iter() {
            self.set(name, value.clone());
        }
    }

    /// Build a row from a parsed JSON object, keeping key order.
    pub fn from_json_object(map: serde_json::Map<String, serde_json::Value>) -> Result<Self, String> {
        let mut row = Self::new();
        for (name, value) in map {
            let value = FieldValue::from_json(value).map_err(|e| format!("field '{name}': {e}"))?;
            row.fields.push((name, value));
        }
        Ok(row)
    }
}

impl FromIterator<(String, FieldValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (name, value) in iter {
            row.set(&name, value);
        }
        row
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Self::from_json_object(map).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut row = Row::new().with("a", "1").with("b", "2");
        row.set("a", 3.0);
        let names: Vec<&str> = row.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(row.value("a"), &FieldValue::Number(3.0));
        assert_eq!(row.value("missing"), &FieldValue::Null);
    }

    #[test]
    fn test_deserialize_keeps_order_and_maps_scalars() {
        let row: Row =
            serde_json::from_str(r#"{"z":"x","a":1.5,"flag":true,"none":null}"#).unwrap();
        let names: Vec<&str> = row.names().collect();
        assert_eq!(names, vec!["z", "a", "flag", "none"]);
        assert_eq!(row.value("flag"), &FieldValue::Number(1.0));
        assert_eq!(row.value("none"), &FieldValue::Null);
    }

    #[test]
    fn test_deserialize_rejects_nested_values() {
        let err = serde_json::from_str::<Row>(r#"{"a":[1,2]}"#).unwrap_err();
        assert!(err.to_string().contains("field 'a'"));
        assert!(serde_json::from_str::<Row>(r#"{"a":{"b":1}}"#).is_err());
    }

    #[test]
    fn test_display_value() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(FieldValue::from(day).display_value().as_deref(), Some("2026-01-15"));
        assert_eq!(FieldValue::from(100.0).display_value().as_deref(), Some("100"));
        assert_eq!(FieldValue::from(100.5).display_value().as_deref(), Some("100.5"));
        assert_eq!(FieldValue::from("  Paid ").display_value().as_deref(), Some("Paid"));
        assert_eq!(FieldValue::from("   ").display_value(), None);
        assert_eq!(FieldValue::Null.display_value(), None);
    }

    #[test]
    fn test_local_datetime_keeps_wall_clock() {
        let local = Local.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).single().unwrap();
        let FieldValue::Date(dt) = FieldValue::from(local) else {
            panic!("expected a date");
        };
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.25), "0.25");
    }
}
