//! # Fabrica CLI Module
//!
//! Thin command surface over `fabrica-core`. Every command maps onto one core
//! operation.
//!
//! ## Available Commands
//!
//! - `status` - Braid, ledger and sync summary
//! - `process` - Run documents through the cascade
//! - `kernels` - List the kernels `process` runs
//! - `executions` / `trace` / `stats` / `verify-seal` - Ledger inspection
//! - `export` - Ledger export to JSON or CSV
//! - `sync` / `verify` / `latest` - Chain sync
//! - `anchor` / `verify-anchor` - Scroll anchors
//! - `link` / `tag` / `remove` / `query` - Braid editing and queries

mod commands;

use crate::config::load_config;
use clap::{Parser, Subcommand, ValueEnum};
use fabrica_core::FabricaError;
use fabrica_core::primitives::DEFAULT_MAX_HOPS;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Fabrica - Document Ledger
///
/// A typed document graph beside a sealed, append-only execution ledger.
#[derive(Parser, Debug)]
#[command(name = "fabrica")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show braid, ledger and sync status
    Status,

    /// Process documents through the cascade
    Process {
        /// Documents to process, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// JSON object passed to every kernel as starting context
        #[arg(long)]
        context: Option<String>,

        /// Skip the enrichment provider
        #[arg(long)]
        no_enrichment: bool,

        /// Skip chain sync after each document
        #[arg(long)]
        no_sync: bool,
    },

    /// List the kernels run by `process`
    Kernels,

    /// Show recent executions, or one execution in full
    Executions {
        /// Execution ID to show
        #[arg(long)]
        id: Option<String>,

        /// Number of executions to list, newest first
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Export every execution to a file
    Export {
        /// Output file
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },

    /// Show the execution tree containing an execution
    Trace {
        /// Execution ID
        id: String,
    },

    /// Show ledger statistics
    Stats,

    /// Record the current ledger state in the sync log
    Sync {
        /// Append an entry even if the state is already logged
        #[arg(short, long)]
        force: bool,
    },

    /// Check that the current ledger state is logged
    Verify,

    /// Show the newest sync entry
    Latest,

    /// Recompute and check an execution seal
    VerifySeal {
        /// Execution ID
        id: String,
    },

    /// Anchor a document in the codex chain
    Anchor {
        /// Document path
        file: PathBuf,

        /// Operator recorded on the entry
        #[arg(short, long, default_value = "system")]
        operator: String,
    },

    /// Check a document against its codex anchor
    VerifyAnchor {
        /// Document path
        file: PathBuf,
    },

    /// Link two documents
    Link {
        /// Source document ID
        source: String,

        /// Target document ID
        target: String,

        /// Link type
        #[arg(short = 't', long, default_value = "related_to")]
        link_type: String,

        /// Link weight, clamped into [0, 1]
        #[arg(short, long, default_value = "1.0")]
        weight: f64,
    },

    /// Tag a document
    Tag {
        /// Document ID
        id: String,

        /// Tag to add
        tag: String,
    },

    /// Remove a document and every link to it
    Remove {
        /// Document ID
        id: String,
    },

    /// Query the braid
    #[command(subcommand)]
    Query(QueryCommands),
}

/// Braid queries.
#[derive(Subcommand, Debug)]
pub enum QueryCommands {
    /// Documents linked from a document, strongest first
    Related {
        /// Document ID
        id: String,

        /// Only follow this link type
        #[arg(short = 't', long)]
        link_type: Option<String>,

        /// Minimum link weight
        #[arg(short, long, default_value = "0.0")]
        min_weight: f64,
    },

    /// Shortest path between two documents
    Path {
        /// Source document ID
        source: String,

        /// Target document ID
        target: String,

        /// Search depth
        #[arg(short, long, default_value_t = DEFAULT_MAX_HOPS)]
        max_hops: usize,
    },

    /// Documents carrying a tag
    Tag {
        /// Tag (case-insensitive)
        tag: String,
    },

    /// Weakly connected components
    Components,
}

/// Ledger export formats.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), FabricaError> {
    let config = load_config(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Process {
            files,
            context,
            no_enrichment,
            no_sync,
        }) => cmd_process(
            &config,
            json_mode,
            &files,
            context.as_deref(),
            no_enrichment,
            no_sync,
        ),
        Some(Commands::Kernels) => cmd_kernels(&config, json_mode),
        Some(Commands::Executions { id, limit }) => {
            cmd_executions(&config, json_mode, id.as_deref(), limit)
        }
        Some(Commands::Export { output, format }) => cmd_export(&config, json_mode, &output, format),
        Some(Commands::Trace { id }) => cmd_trace(&config, json_mode, &id),
        Some(Commands::Stats) => cmd_stats(&config, json_mode),
        Some(Commands::Sync { force }) => cmd_sync(&config, json_mode, force),
        Some(Commands::Verify) => cmd_verify(&config, json_mode),
        Some(Commands::Latest) => cmd_latest(&config, json_mode),
        Some(Commands::VerifySeal { id }) => cmd_verify_seal(&config, json_mode, &id),
        Some(Commands::Anchor { file, operator }) => {
            cmd_anchor(&config, json_mode, &file, &operator)
        }
        Some(Commands::VerifyAnchor { file }) => cmd_verify_anchor(&config, json_mode, &file),
        Some(Commands::Link {
            source,
            target,
            link_type,
            weight,
        }) => cmd_link(&config, json_mode, &source, &target, &link_type, weight),
        Some(Commands::Tag { id, tag }) => cmd_tag(&config, json_mode, &id, &tag),
        Some(Commands::Remove { id }) => cmd_remove(&config, json_mode, &id),
        Some(Commands::Query(query)) => cmd_query(&config, json_mode, &query),
    }
}
