//! sheetsync - idempotent batch import of spreadsheet rows into SQLite
//!
//! This crate provides the core functionality for the `sheetsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Row, FieldValue)
//! - [`storage`] - SQLite database layer, drift repair, change log
//! - [`sync`] - Key normalization, existence checks and the batch engine
//! - [`config`] - Path resolution and department profiles
//! - [`validate`] - Identifier quoting, department slugs, row validators
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
