//! Batch synchronization engine.
//!
//! Every call runs in one IMMEDIATE transaction:
//!
//! 1. repair the destination table's structure
//! 2. read the actual column set once
//! 3. look up every row's key variants in one chunked existence check
//! 4. validate, key, filter and then insert, skip or update each row in order
//! 5. commit, or roll back everything when a connection-level error escapes
//!
//! Row-level failures (validation, constraint violations) are collected in
//! [`BatchResult::errors`] and never abort the batch. Anything that makes the
//! transaction itself untrustworthy rolls back the whole call and is reported
//! as `success = false`.

use std::collections::BTreeSet;

use rusqlite::Connection;
use tracing::{debug, error, info, info_span, warn};

use super::index::{ExistingChecker, ExistingIndex, PresenceCheck, SnapshotCheck};
use super::key::{CompositeKey, KeySpec};
use super::tracker::{ChangeTracker, DEFAULT_CHANGED_BY};
use super::types::{BatchOptions, BatchResult, PreviewResult, UpsertOptions};
use crate::config::departments::{DepartmentProfile, FINANCE, ROAD_CONSTRUCTION};
use crate::error::{Error, Result};
use crate::model::Row;
use crate::storage::migrations::{MigrationReport, ensure_table_structure};
use crate::storage::schema::schema_for;
use crate::storage::sqlite::{MutationContext, SqliteStorage};
use crate::storage::table::{TableColumns, insert_row, table_columns, update_row};
use crate::validate::RowValidator;

/// Decides whether a failed write lost a uniqueness race.
///
/// Matching errors count as skipped rows instead of errors.
pub trait ErrorClassifier {
    fn is_duplicate(&self, err: &Error) -> bool;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&Error) -> bool,
{
    fn is_duplicate(&self, err: &Error) -> bool {
        self(err)
    }
}

/// Matches SQLite `UNIQUE` and `PRIMARY KEY` constraint failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniqueViolation;

impl ErrorClassifier for UniqueViolation {
    fn is_duplicate(&self, err: &Error) -> bool {
        const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
        const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

        match err {
            Error::Database(rusqlite::Error::SqliteFailure(e, message)) => {
                matches!(
                    e.extended_code,
                    SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY
                ) || message
                    .as_deref()
                    .is_some_and(|m| m.starts_with("UNIQUE constraint failed"))
            }
            _ => false,
        }
    }
}

/// Collaborators for one batch call.
struct BatchRun<'r> {
    table: &'r str,
    key_spec: &'r KeySpec,
    validator: &'r dyn RowValidator,
    checker: &'r dyn ExistingChecker,
    classifier: Option<&'r dyn ErrorClassifier>,
    upsert: Option<&'r UpsertOptions>,
}

/// What happened to one row that reached the write step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Batch engine over a borrowed storage handle.
///
/// The engine never opens or closes connections; the caller owns the
/// storage for the whole call.
pub struct BatchSyncEngine<'a> {
    storage: &'a mut SqliteStorage,
}

impl<'a> BatchSyncEngine<'a> {
    #[must_use]
    pub fn new(storage: &'a mut SqliteStorage) -> Self {
        Self { storage }
    }

    /// Create or repair a registered destination table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTable`] for unregistered tables, or the
    /// migration error that rolled the repair back.
    pub fn ensure_table_structure(&mut self, table: &str) -> Result<MigrationReport> {
        let schema = schema_for(table)?;
        self.storage
            .mutate("ensure_table_structure", DEFAULT_CHANGED_BY, |tx, _| {
                ensure_table_structure(tx, schema)
            })
    }

    /// Insert-only batch with every collaborator injected.
    ///
    /// Rows whose key is already stored are skipped; errors the classifier
    /// recognizes as duplicates are skipped too.
    pub fn execute_batch_insert(
        &mut self,
        rows: &[Row],
        table: &str,
        key_spec: &KeySpec,
        validator: &dyn RowValidator,
        checker: &dyn ExistingChecker,
        classifier: Option<&dyn ErrorClassifier>,
    ) -> BatchResult {
        let run = BatchRun {
            table,
            key_spec,
            validator,
            checker,
            classifier,
            upsert: None,
        };
        self.run("batch_insert", rows, &run)
    }

    /// Insert new rows and update stored ones, auditing `tracked_fields`.
    pub fn execute_batch_upsert_with_tracking(
        &mut self,
        rows: &[Row],
        table: &str,
        key_spec: &KeySpec,
        validator: &dyn RowValidator,
        tracked_fields: &[String],
        changed_by: &str,
    ) -> BatchResult {
        let options = UpsertOptions {
            tracked_fields: tracked_fields.to_vec(),
            changed_by: changed_by.to_string(),
        };
        let run = BatchRun {
            table,
            key_spec,
            validator,
            checker: &SnapshotCheck,
            classifier: Some(&UniqueViolation),
            upsert: Some(&options),
        };
        self.run("batch_upsert", rows, &run)
    }

    /// Finance upload into `table`. `options.upsert` selects
    /// upsert-with-tracking.
    pub fn batch_insert_data(&mut self, rows: &[Row], table: &str, options: &BatchOptions) -> BatchResult {
        self.import_into(&FINANCE, table, rows, options)
    }

    /// Road-construction upload into `table` (insert-only).
    pub fn batch_insert_road_construction_data(&mut self, rows: &[Row], table: &str) -> BatchResult {
        self.import_into(&ROAD_CONSTRUCTION, table, rows, &BatchOptions::insert_only())
    }

    /// Finance dry run against `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rehearsal transaction fails.
    pub fn preview_batch_insert(&mut self, rows: &[Row], table: &str) -> Result<PreviewResult> {
        self.preview_into(&FINANCE, table, rows)
    }

    /// Upload into the department's own table.
    pub fn import(&mut self, profile: &DepartmentProfile, rows: &[Row], options: &BatchOptions) -> BatchResult {
        self.import_into(profile, profile.table(), rows, options)
    }

    /// Dry run against the department's own table.
    ///
    /// # Errors
    ///
    /// Returns an error if the rehearsal transaction fails.
    pub fn preview(&mut self, profile: &DepartmentProfile, rows: &[Row]) -> Result<PreviewResult> {
        self.preview_into(profile, profile.table(), rows)
    }

    fn import_into(
        &mut self,
        profile: &DepartmentProfile,
        table: &str,
        rows: &[Row],
        options: &BatchOptions,
    ) -> BatchResult {
        match &options.upsert {
            Some(upsert) => self.execute_batch_upsert_with_tracking(
                rows,
                table,
                profile.key_spec,
                profile,
                &upsert.tracked_fields,
                &upsert.changed_by,
            ),
            None => self.execute_batch_insert(
                rows,
                table,
                profile.key_spec,
                profile,
                &PresenceCheck,
                Some(&UniqueViolation),
            ),
        }
    }

    fn preview_into(&mut self, profile: &DepartmentProfile, table: &str, rows: &[Row]) -> Result<PreviewResult> {
        let span = info_span!("batch_preview", table, department = profile.slug);
        let _enter = span.enter();

        let preview = self
            .storage
            .rehearse("preview", |tx| preview_rows(tx, rows, table, profile.key_spec, profile))?;
        info!(
            would_insert = preview.would_insert_count,
            would_skip = preview.would_skip_count,
            rejected = preview.rejected_count,
            "Preview complete"
        );
        Ok(preview)
    }

    fn run(&mut self, op: &str, rows: &[Row], run: &BatchRun<'_>) -> BatchResult {
        let batch_id = format!("batch_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let span = info_span!("batch_sync", op, table = run.table, batch_id = %batch_id);
        let _enter = span.enter();

        let actor = run.upsert.map_or(DEFAULT_CHANGED_BY, |u| u.changed_by.as_str());
        let mut result = BatchResult::default();

        let outcome = self
            .storage
            .mutate(op, actor, |tx, ctx| sync_rows(tx, ctx, rows, run, &mut result));

        match outcome {
            Ok(()) => {
                result.success = true;
                info!(
                    rows = rows.len(),
                    inserted = result.inserted_count,
                    updated = result.updated_count,
                    skipped = result.skipped_count,
                    malformed = result.malformed_count,
                    errors = result.errors.len(),
                    "Batch committed"
                );
            }
            Err(e) => {
                error!(error = %e, "Batch rolled back");
                result.success = false;
                result.errors.push(format!("Transaction failed: {e}"));
            }
        }
        result
    }
}

/// Body of one batch transaction.
fn sync_rows(
    conn: &Connection,
    ctx: &mut MutationContext,
    rows: &[Row],
    run: &BatchRun<'_>,
    result: &mut BatchResult,
) -> Result<()> {
    let schema = schema_for(run.table)?;
    ensure_table_structure(conn, schema)?;
    let columns = table_columns(conn, schema.table)?;

    let keyed: Vec<Vec<CompositeKey>> = rows.iter().map(|r| run.key_spec.variants(r)).collect();
    let lookup: Vec<CompositeKey> = keyed.iter().flatten().cloned().collect();
    let mut index = run.checker.check(conn, &lookup, &columns, run.key_spec)?;
    debug!(lookup = lookup.len(), stored = index.len(), "Existence check done");

    let tracker = match run.upsert {
        Some(upsert) if index.has_snapshots() => Some(
            ChangeTracker::new(schema.table, &upsert.tracked_fields, &upsert.changed_by)
                .with_columns(&columns),
        ),
        Some(_) => {
            return Err(Error::Other(
                "upsert needs stored records from the existence check".to_string(),
            ));
        }
        None => None,
    };

    let mut dropped = BTreeSet::new();
    for (i, (row, variants)) in rows.iter().zip(&keyed).enumerate() {
        let line = i + 1;

        if let Err(message) = run.validator.validate(row) {
            debug!(row = line, %message, "Row failed validation");
            result.errors.push(format!("Row {line}: {message}"));
            continue;
        }

        let Some(full_key) = variants.first() else {
            warn!(row = line, "Row has no usable key, skipping");
            result.malformed_count += 1;
            continue;
        };

        let filtered = columns.filter_row(row, &mut dropped);
        if filtered.is_empty() {
            result
                .errors
                .push(format!("Row {line}: no fields match the columns of {}", schema.table));
            continue;
        }

        let outcome = match (index.find(variants), tracker.as_ref()) {
            (Some(_), None) => Ok(RowOutcome::Skipped),
            (Some(stored_key), Some(tracker)) => update_stored(
                conn,
                ctx,
                &columns,
                tracker,
                &mut index,
                stored_key,
                full_key,
                &filtered,
            ),
            (None, _) => insert_row(conn, &columns, &filtered).map(|id| {
                index.remember(full_key.clone(), id, &filtered);
                RowOutcome::Inserted
            }),
        };

        match outcome {
            Ok(RowOutcome::Inserted) => result.inserted_count += 1,
            Ok(RowOutcome::Updated) => result.updated_count += 1,
            Ok(RowOutcome::Skipped) => result.skipped_count += 1,
            Err(e) if run.classifier.is_some_and(|c| c.is_duplicate(&e)) => {
                debug!(row = line, key = %full_key, "Lost uniqueness race, skipping");
                result.skipped_count += 1;
            }
            Err(e) if e.is_transaction_fatal() => return Err(e),
            Err(e) => {
                warn!(row = line, error = %e, "Row rejected");
                result.errors.push(format!("Row {line}: {e}"));
            }
        }
    }

    if !dropped.is_empty() {
        warn!(
            table = schema.table,
            columns = ?dropped,
            "Dropped fields with no matching column"
        );
    }
    Ok(())
}

/// Update a stored record and queue change-log entries for it.
#[allow(clippy::too_many_arguments)]
fn update_stored(
    conn: &Connection,
    ctx: &mut MutationContext,
    columns: &TableColumns,
    tracker: &ChangeTracker<'_>,
    index: &mut ExistingIndex,
    stored_key: &CompositeKey,
    full_key: &CompositeKey,
    incoming: &Row,
) -> Result<RowOutcome> {
    let Some(stored) = index.record(stored_key).cloned() else {
        return Ok(RowOutcome::Skipped);
    };

    update_row(conn, columns, stored.id, incoming)?;
    ctx.record_changes(tracker.diff(stored.id, &stored.row, incoming));

    let mut merged = stored.row;
    merged.merge(incoming);
    if stored_key != full_key {
        index.remember(full_key.clone(), stored.id, &merged);
    }
    index.remember(stored_key.clone(), stored.id, &merged);
    Ok(RowOutcome::Updated)
}

/// Same key and existence logic as a batch, counting instead of writing.
fn preview_rows(
    conn: &Connection,
    rows: &[Row],
    table: &str,
    key_spec: &KeySpec,
    validator: &dyn RowValidator,
) -> Result<PreviewResult> {
    let schema = schema_for(table)?;
    ensure_table_structure(conn, schema)?;
    let columns = table_columns(conn, schema.table)?;

    let keyed: Vec<Vec<CompositeKey>> = rows.iter().map(|r| key_spec.variants(r)).collect();
    let lookup: Vec<CompositeKey> = keyed.iter().flatten().cloned().collect();
    let mut index = PresenceCheck.check(conn, &lookup, &columns, key_spec)?;

    let mut preview = PreviewResult::default();
    for (row, variants) in rows.iter().zip(&keyed) {
        if validator.validate(row).is_err() {
            preview.rejected_count += 1;
            continue;
        }
        let Some(full_key) = variants.first() else {
            preview.rejected_count += 1;
            continue;
        };

        if index.find(variants).is_some() {
            preview.would_skip_count += 1;
            preview.duplicate_keys.push(full_key.to_string());
        } else {
            preview.would_insert_count += 1;
            index.remember(full_key.clone(), 0, row);
        }
    }
    Ok(preview)
}
