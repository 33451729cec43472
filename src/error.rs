//! Error types for sheetsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Row-level problems inside a batch never become an `Error`; they are
//! collected into `BatchResult::errors`. Only failures that abort a whole
//! transaction (or happen before one starts) travel through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sheetsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,
    MigrationFailed,

    // Not Found (exit 3)
    UnknownTable,
    UnknownColumn,
    UnknownDepartment,
    FileNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidRow,

    // Sync (exit 6)
    BatchFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::UnknownTable => "UNKNOWN_TABLE",
            Self::UnknownColumn => "UNKNOWN_COLUMN",
            Self::UnknownDepartment => "UNKNOWN_DEPARTMENT",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidRow => "INVALID_ROW",
            Self::BatchFailed => "BATCH_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError | Self::MigrationFailed => 2,
            Self::UnknownTable
            | Self::UnknownColumn
            | Self::UnknownDepartment
            | Self::FileNotFound => 3,
            Self::InvalidArgument | Self::InvalidRow => 4,
            Self::BatchFailed => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running with corrected input (or after a busy writer
    /// finishes) can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::InvalidRow
                | Self::UnknownDepartment
                | Self::DatabaseError
                | Self::BatchFailed
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in sheetsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no database at {}", .path.display())]
    NotInitialized { path: PathBuf },

    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    #[error("Unknown column '{column}' in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Unknown department: {slug}")]
    UnknownDepartment { slug: String },

    #[error("Rows file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Invalid row at line {line}: {message}")]
    InvalidRow { line: usize, message: String },

    #[error("Failed to add column '{column}' to {table}: {source}")]
    Migration {
        table: String,
        column: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{0}")]
    BatchFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Migration { .. } => ErrorCode::MigrationFailed,
            Self::UnknownTable { .. } => ErrorCode::UnknownTable,
            Self::UnknownColumn { .. } => ErrorCode::UnknownColumn,
            Self::UnknownDepartment { .. } => ErrorCode::UnknownDepartment,
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::InvalidRow { .. } => ErrorCode::InvalidRow,
            Self::BatchFailed(_) => ErrorCode::BatchFailed,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether this failure comes from the connection or the storage medium
    /// rather than from the values of a single row.
    ///
    /// Busy/locked databases, I/O failures, a full disk, corruption and
    /// interrupts all mean the transaction itself is no longer trustworthy.
    /// Constraint, type and size violations only concern the statement that
    /// raised them.
    #[must_use]
    pub fn is_transaction_fatal(&self) -> bool {
        use rusqlite::ErrorCode as Sqlite;

        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => !matches!(
                err.code,
                Sqlite::ConstraintViolation
                    | Sqlite::TypeMismatch
                    | Sqlite::TooBig
                    | Sqlite::ParameterOutOfRange
            ),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { .. } => {
                Some("Run `sheetsync init` to create the database".to_string())
            }

            Self::UnknownTable { .. } => Some(format!(
                "Registered tables: {}",
                crate::storage::schema::registered_table_names().join(", ")
            )),

            Self::UnknownDepartment { .. } => Some(
                "Valid departments: finance, road-construction. \
                 Synonyms: expense→finance, road→road-construction"
                    .to_string(),
            ),

            Self::FileNotFound { .. } => {
                Some("Rows are read as JSONL: one JSON object per line".to_string())
            }

            Self::Migration { column, .. } => Some(format!(
                "Column '{column}' cannot be added automatically. \
                 Add it by hand or relax its NOT NULL constraint."
            )),

            Self::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                Some(
                    "Another writer holds the database. Retry, or raise \
                     SHEETSYNC_BUSY_TIMEOUT_MS."
                        .to_string(),
                )
            }

            Self::BatchFailed(_) => {
                Some("Nothing was written. Fix the cause and re-run the same file.".to_string())
            }

            Self::UnknownColumn { .. }
            | Self::InvalidRow { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
