//! CLI argument definitions for the compliance engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "phi-engine",
    version,
    about = "Health-record transformation and compliance engine",
    long_about = "Validate, redact, and encrypt health-record batches.\n\n\
                  Records are validated against a versioned schema, scanned for PII,\n\
                  filtered by role entitlement, and field-encrypted, with an\n\
                  append-only audit trail covering every decision."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow record-level values (PHI) in trace logs. Off by default.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process a batch of records through the compliance pipeline.
    Process(ProcessArgs),

    /// Validate a run configuration without touching any records.
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser)]
pub struct ProcessArgs {
    /// Input records, one JSON object per line.
    #[arg(value_name = "RECORDS")]
    pub input: PathBuf,

    /// Run configuration TOML.
    #[arg(long = "config", value_name = "PATH")]
    pub config: PathBuf,

    /// Schema version the batch is declared against.
    #[arg(long = "schema-version", value_name = "VERSION")]
    pub schema_version: String,

    /// Processing role the batch runs under.
    #[arg(long = "role", value_name = "ROLE")]
    pub role: String,

    /// Batch identifier (default: the input file stem).
    #[arg(long = "batch-id", value_name = "ID")]
    pub batch_id: Option<String>,

    /// Output directory for audit trail and processed records
    /// (default: <RECORDS dir>/output).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Run the pipeline and report without writing output files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct CheckConfigArgs {
    /// Run configuration TOML.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
