//! Batch synchronization of spreadsheet rows into SQLite.
//!
//! - **Normalize**: one canonical string per value, whatever shape it
//!   arrived in
//! - **Key**: composite business keys built from normalized fields
//! - **Index**: chunked lookup of keys that are already stored
//! - **Tracker**: field-level audit of upserts
//! - **Engine**: the per-call transaction tying it all together
//!
//! # Example
//!
//! ```ignore
//! use sheetsync::storage::SqliteStorage;
//! use sheetsync::sync::{BatchOptions, BatchSyncEngine, read_rows_jsonl};
//!
//! let mut storage = SqliteStorage::open(&db_path)?;
//! let rows = read_rows_jsonl(&rows_path)?;
//!
//! let mut engine = BatchSyncEngine::new(&mut storage);
//! let result = engine.batch_insert_data(&rows, "expend_form", &BatchOptions::insert_only());
//! assert!(result.success);
//! ```

pub mod engine;
pub mod file;
pub mod index;
pub mod key;
pub mod normalize;
pub mod tracker;
pub mod types;

pub use engine::{BatchSyncEngine, ErrorClassifier, UniqueViolation};
pub use file::read_rows_jsonl;
pub use index::{
    ExistingChecker, ExistingIndex, KEY_CHUNK_SIZE, PresenceCheck, SnapshotCheck, StoredRecord,
    batch_query_data, batch_query_keys,
};
pub use key::{
    COMPOSITE_KEY_SEPARATOR, CompositeKey, FINANCE_KEY_SPEC, KeyField, KeySpec,
    ROAD_CONSTRUCTION_KEY_SPEC,
};
pub use normalize::{KeyKind, normalize};
pub use tracker::{ChangeTracker, diff_and_log};
pub use types::{BatchOptions, BatchResult, PreviewResult, UpsertOptions};
