//! Data models for sheetsync.
//!
//! - [`Row`]: one parsed spreadsheet row, an ordered list of named fields
//! - [`FieldValue`]: the tagged value held by each field

pub mod row;

pub use row::{FieldValue, Row, format_number};
