//! SQLite storage layer for sheetsync.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - IMMEDIATE transactions for batch writes
//! - Drift repair of destination tables
//! - An append-only change log for upserts
//!
//! # Submodules
//!
//! - [`changelog`] - Change-log storage
//! - [`migrations`] - Destination-table drift repair
//! - [`schema`] - Canonical schemas and definition parsing
//! - [`sqlite`] - Connection ownership and transaction protocol
//! - [`table`] - Column introspection and row writes

pub mod changelog;
pub mod migrations;
pub mod schema;
pub mod sqlite;
pub mod table;

pub use changelog::{ChangeLogEntry, ChangeType};
pub use migrations::{MigrationReport, ensure_table_structure};
pub use schema::{CanonicalSchema, schema_for};
pub use sqlite::{MutationContext, SqliteStorage};
pub use table::{ColumnKind, TableColumns};
