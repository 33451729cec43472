//! Department profiles.
//!
//! A profile binds everything a department's upload needs: destination
//! schema, key layout, required fields, audited fields and date rules.
//! The engine takes a profile and never branches on the department name.

use crate::error::{Error, Result};
use crate::model::Row;
use crate::storage::schema::{CanonicalSchema, EXPEND_FORM_SCHEMA, ROAD_CONSTRUCTION_SCHEMA};
use crate::sync::key::{FINANCE_KEY_SPEC, KeySpec, ROAD_CONSTRUCTION_KEY_SPEC};
use crate::sync::normalize::{local_today, parse_local_day};
use crate::sync::tracker::DEFAULT_TRACKED_FIELDS;
use crate::validate::{RequiredFields, RowValidator, normalize_department};

/// Static description of one department's uploads.
#[derive(Debug)]
pub struct DepartmentProfile {
    /// Canonical slug, as accepted by [`department`].
    pub slug: &'static str,
    pub display_name: &'static str,
    pub schema: &'static CanonicalSchema,
    pub key_spec: &'static KeySpec,
    /// Fields that must be present and non-empty.
    pub required_fields: &'static [&'static str],
    /// Fields audited by upserts when the caller names none.
    pub tracked_fields: &'static [&'static str],
    /// A date field that may not lie after today's local date.
    pub no_future_dates: Option<&'static str>,
}

pub static FINANCE: DepartmentProfile = DepartmentProfile {
    slug: "finance",
    display_name: "Finance",
    schema: &EXPEND_FORM_SCHEMA,
    key_spec: &FINANCE_KEY_SPEC,
    required_fields: &["form_no"],
    tracked_fields: DEFAULT_TRACKED_FIELDS,
    no_future_dates: None,
};

pub static ROAD_CONSTRUCTION: DepartmentProfile = DepartmentProfile {
    slug: "road-construction",
    display_name: "Road construction",
    schema: &ROAD_CONSTRUCTION_SCHEMA,
    key_spec: &ROAD_CONSTRUCTION_KEY_SPEC,
    required_fields: &["work_order_no", "item_name", "work_date", "quantity"],
    tracked_fields: &[],
    no_future_dates: Some("work_date"),
};

pub static DEPARTMENTS: &[&DepartmentProfile] = &[&FINANCE, &ROAD_CONSTRUCTION];

/// Look up a profile by slug or synonym.
///
/// # Errors
///
/// Returns [`Error::UnknownDepartment`] for anything else.
pub fn department(slug: &str) -> Result<&'static DepartmentProfile> {
    let canonical = normalize_department(slug)?;
    DEPARTMENTS
        .iter()
        .copied()
        .find(|p| p.slug == canonical)
        .ok_or_else(|| Error::UnknownDepartment {
            slug: slug.to_string(),
        })
}

impl DepartmentProfile {
    /// Destination table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.schema.table
    }

    /// Tracked fields as owned strings, for [`crate::sync::UpsertOptions`].
    #[must_use]
    pub fn default_tracked_fields(&self) -> Vec<String> {
        self.tracked_fields.iter().map(ToString::to_string).collect()
    }
}

impl RowValidator for DepartmentProfile {
    fn validate(&self, row: &Row) -> std::result::Result<(), String> {
        RequiredFields(self.required_fields).validate(row)?;

        if let Some(field) = self.no_future_dates {
            let value = row.value(field);
            if !value.is_missing() {
                match parse_local_day(value) {
                    Some(day) if day > local_today() => {
                        return Err(format!("{field} {day} is in the future"));
                    }
                    Some(_) => {}
                    None => return Err(format!("{field} is not a date")),
                }
            }
        }
        Ok(())
    }
}
