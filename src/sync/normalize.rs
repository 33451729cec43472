//! Key normalization.
//!
//! Turns heterogeneous cell values into the canonical strings that make up a
//! composite key. Everything here is total: malformed input yields the empty
//! representation of its kind, never an error or a panic.
//!
//! Dates are pure calendar arithmetic on the local wall clock. A value never
//! passes through UTC, so a row dated 2026-01-15 keys as 2026-01-15 no
//! matter which zone the process runs in.

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;

use crate::model::{FieldValue, format_number};

/// How a key component is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    String,
    Date,
    Decimal,
}

/// Spreadsheet day zero. Serial 1 would be 1899-12-31 under this epoch;
/// serials below 61 are shifted by one day to undo the phantom 1900-02-29.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Last representable spreadsheet day (9999-12-31).
const MAX_SERIAL: f64 = 2_958_466.0;

/// Normalize a value according to its key kind.
#[must_use]
pub fn normalize(value: &FieldValue, kind: KeyKind) -> String {
    match kind {
        KeyKind::String => normalize_text(value),
        KeyKind::Date => normalize_date(value),
        KeyKind::Decimal => normalize_decimal(value),
    }
}

/// Trimmed text. Integral numbers lose their `.0`; dates render as their
/// local day.
#[must_use]
pub fn normalize_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::Text(s) => s.trim().to_string(),
        FieldValue::Number(n) => format_number(*n),
        FieldValue::Date(dt) => dt.date().format("%Y-%m-%d").to_string(),
    }
}

/// Local calendar day as `YYYY-MM-DD`, or `""` when unparseable.
#[must_use]
pub fn normalize_date(value: &FieldValue) -> String {
    parse_local_day(value)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Two-decimal rendering, `"0.00"` for anything that is not a finite number.
#[must_use]
pub fn normalize_decimal(value: &FieldValue) -> String {
    format_cents(parse_decimal(value).unwrap_or(0.0))
}

/// Render `n` with two decimals, rounding an exact half cent away from zero.
///
/// The decision is made on the exact binary value: `0.125` is a true tie and
/// becomes `"0.13"`, while `2.675` is stored just below the tie and stays
/// `"2.67"`. Never renders `"-0.00"`.
#[must_use]
pub fn format_cents(n: f64) -> String {
    let magnitude = n.abs();
    let magnitude = if is_half_cent(magnitude) {
        // Nudge off the tie so fixed formatting rounds up.
        f64::from_bits(magnitude.to_bits() + 1)
    } else {
        magnitude
    };
    let formatted = format!("{magnitude:.2}");
    if n.is_sign_negative() && formatted != "0.00" {
        format!("-{formatted}")
    } else {
        formatted
    }
}

/// Whether a finite, non-negative value ends in exactly half a cent.
fn is_half_cent(magnitude: f64) -> bool {
    let exact = format!("{magnitude:.40}");
    exact.split_once('.').is_some_and(|(_, fraction)| {
        fraction.as_bytes().get(2) == Some(&b'5') && fraction.bytes().skip(3).all(|b| b == b'0')
    })
}

/// Resolve any date representation to a local calendar day.
///
/// Accepts native dates, `YYYY-MM-DD` / `YYYY/MM/DD` (optionally followed
/// by a time part, which is ignored), `MM/DD/YYYY`, `MM/DD/YY` and
/// spreadsheet serials given either as numbers or numeric strings.
#[must_use]
pub fn parse_local_day(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Null => None,
        FieldValue::Date(dt) => Some(dt.date()),
        FieldValue::Number(n) => serial_to_date(*n),
        FieldValue::Text(s) => parse_date_text(s.trim()),
    }
}

/// Parse a number, stripping thousands separators. Non-finite and blank
/// values are `None`.
#[must_use]
pub fn parse_decimal(value: &FieldValue) -> Option<f64> {
    let n = match value {
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        FieldValue::Null | FieldValue::Date(_) => return None,
    };
    n.is_finite().then_some(n)
}

/// Convert a spreadsheet serial to a calendar day. The fractional part is a
/// time of day and is dropped.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= MAX_SERIAL {
        return None;
    }
    let mut days = serial.floor() as i64;
    if days < 61 {
        days += 1;
    }
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(days))
}

/// Today on the local wall clock.
#[must_use]
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }

    // Drop a trailing time part: "2026-01-15T08:00:00Z", "1/15/2026 0:00"
    let date_part = s
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(s);

    let parts: Vec<&str> = date_part.split(['-', '/']).collect();
    if parts.len() == 1 {
        return parts[0].parse::<f64>().ok().and_then(serial_to_date);
    }
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let num = |p: &str| p.parse::<u32>().ok();
    let (year, month, day) = match (parts[0].len(), parts[2].len()) {
        (4, _) => (parts[0].parse::<i32>().ok()?, num(parts[1])?, num(parts[2])?),
        (1 | 2, 4) => (parts[2].parse::<i32>().ok()?, num(parts[0])?, num(parts[1])?),
        (1 | 2, 2) => (2000 + parts[2].parse::<i32>().ok()?, num(parts[0])?, num(parts[1])?),
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text(&text("  F1 ")), "F1");
        assert_eq!(normalize_text(&FieldValue::Null), "");
        assert_eq!(normalize_text(&FieldValue::Number(12345.0)), "12345");
    }

    #[test]
    fn test_date_representations_agree() {
        let native = FieldValue::from(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
        let expected = "2026-01-15";
        assert_eq!(normalize_date(&native), expected);
        assert_eq!(normalize_date(&text("2026-01-15")), expected);
        assert_eq!(normalize_date(&text("2026/01/15")), expected);
        assert_eq!(normalize_date(&text("2026-1-15")), expected);
        assert_eq!(normalize_date(&text("01/15/2026")), expected);
        assert_eq!(normalize_date(&text("1/15/26")), expected);
        assert_eq!(normalize_date(&FieldValue::Number(46037.0)), expected);
        assert_eq!(normalize_date(&text("46037")), expected);
    }

    #[test]
    fn test_time_suffix_does_not_shift_the_day() {
        assert_eq!(normalize_date(&text("2026-01-15T23:30:00Z")), "2026-01-15");
        assert_eq!(normalize_date(&text("2026-01-15T00:30:00+08:00")), "2026-01-15");
        assert_eq!(normalize_date(&text("2026-01-15 23:59:59")), "2026-01-15");

        let late = NaiveDateTime::parse_from_str("2026-01-15 23:59:59", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(normalize_date(&FieldValue::Date(late)), "2026-01-15");
        // fractional serial = time of day
        assert_eq!(normalize_date(&FieldValue::Number(46037.99)), "2026-01-15");
    }

    #[test]
    fn test_unparseable_dates_are_empty() {
        assert_eq!(normalize_date(&text("N/A")), "");
        assert_eq!(normalize_date(&text("2026-02-30")), "");
        assert_eq!(normalize_date(&text("")), "");
        assert_eq!(normalize_date(&FieldValue::Null), "");
        assert_eq!(normalize_date(&FieldValue::Number(-5.0)), "");
        assert_eq!(normalize_date(&FieldValue::Number(f64::NAN)), "");
    }

    #[test]
    fn test_early_serials_skip_phantom_leap_day() {
        assert_eq!(
            serial_to_date(1.0),
            NaiveDate::from_ymd_opt(1900, 1, 1)
        );
        assert_eq!(
            serial_to_date(61.0),
            NaiveDate::from_ymd_opt(1900, 3, 1)
        );
    }

    #[test]
    fn test_normalize_decimal() {
        assert_eq!(normalize_decimal(&FieldValue::Number(100.5)), "100.50");
        assert_eq!(normalize_decimal(&text("1,234.5")), "1234.50");
        assert_eq!(normalize_decimal(&text(" 100.50 ")), "100.50");
        assert_eq!(normalize_decimal(&text("")), "0.00");
        assert_eq!(normalize_decimal(&text("abc")), "0.00");
        assert_eq!(normalize_decimal(&text("inf")), "0.00");
        assert_eq!(normalize_decimal(&FieldValue::Null), "0.00");
        assert_eq!(normalize_decimal(&FieldValue::Number(-0.001)), "0.00");
        assert_eq!(normalize_decimal(&FieldValue::Number(-12.5)), "-12.50");
    }

    #[test]
    fn test_half_cent_ties_round_away_from_zero() {
        assert_eq!(format_cents(0.125), "0.13");
        assert_eq!(format_cents(10.125), "10.13");
        assert_eq!(format_cents(0.375), "0.38");
        assert_eq!(format_cents(-0.125), "-0.13");
        // Stored just below the tie in binary
        assert_eq!(format_cents(2.675), "2.67");
        assert_eq!(format_cents(1.005), "1.00");
        assert_eq!(format_cents(100.5), "100.50");
        assert_eq!(format_cents(-0.004), "0.00");
        assert_eq!(normalize_decimal(&text("0.125")), "0.13");
    }
}
