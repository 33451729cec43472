//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// sheetsync - idempotent batch import of spreadsheet rows into SQLite
#[derive(Parser, Debug)]
#[command(name = "sheetsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.sheetsync/data/sheetsync.db)
    #[arg(long, global = true, env = "SHEETSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Actor recorded in change-log entries (default: SYNC)
    #[arg(long, global = true, env = "SHEETSYNC_ACTOR")]
    pub actor: Option<String>,

    /// How long to wait for the write lock, in milliseconds
    #[arg(long, global = true, env = "SHEETSYNC_BUSY_TIMEOUT_MS")]
    pub busy_timeout_ms: Option<u64>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and every registered table
    Init,

    /// Create or repair one destination table
    EnsureTable {
        /// Table name (expend_form, road_construction_form)
        table: String,
    },

    /// Import a JSONL rows file for a department
    Import {
        /// Department slug (finance, road-construction) or synonym
        department: String,

        /// Rows file: one JSON object per line
        file: PathBuf,

        /// Update rows that are already stored instead of skipping them
        #[arg(long)]
        upsert: bool,

        /// Field to audit on update (repeatable; default: department's list)
        #[arg(long = "track", value_name = "FIELD", requires = "upsert")]
        track: Vec<String>,
    },

    /// Show what an import would do without writing anything
    Preview {
        /// Department slug (finance, road-construction) or synonym
        department: String,

        /// Rows file: one JSON object per line
        file: PathBuf,
    },

    /// List change-log entries for one record
    Changelog {
        /// Table name
        table: String,

        /// Record identity (rowid)
        record_id: i64,

        /// Maximum entries to return
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Print version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_import_flags() {
        let cli = Cli::try_parse_from([
            "sheetsync", "import", "finance", "rows.jsonl", "--upsert", "--track", "remark",
            "--track", "payment_status",
        ])
        .unwrap();
        match cli.command {
            Commands::Import { upsert, track, .. } => {
                assert!(upsert);
                assert_eq!(track, vec!["remark", "payment_status"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_track_requires_upsert() {
        assert!(
            Cli::try_parse_from(["sheetsync", "import", "finance", "rows.jsonl", "--track", "x"])
                .is_err()
        );
    }
}
