//! CLI struct definitions for the ciwarden command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::core::logging::LogFormat;
use crate::plugins::compliance::ComplianceMode;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "ciwarden",
    version = env!("CARGO_PKG_VERSION"),
    about = "Accumulates CI test outcomes and turns recurring failures into guidance for the components a change touches."
)]
pub(crate) struct Cli {
    /// Config file (default: discover `.ciwarden/warden.toml` upward from the working directory).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Store file, overriding `[store].path`.
    #[clap(long, global = true)]
    pub store: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Diagnostic log format on stderr.
    #[clap(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Write a starter `.ciwarden/warden.toml` and create the store.
    Init(InitCli),
    /// Parse test reports or manifests.
    Ingest(IngestCli),
    /// Check a manifest of executed commands against required commands.
    Check(CheckCli),
    /// Recompute guidance from every recorded test event.
    Recompute {
        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Query active guidance.
    Guidance(GuidanceCli),
    /// Ingest reports, recompute, render and dispatch in one call.
    Pipeline(PipelineCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct InitCli {
    /// Project directory (defaults to the working directory).
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
    /// Overwrite an existing `warden.toml`.
    #[clap(long)]
    pub force: bool,
}

/// Per-run context attached to every event of a report.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct RunContextArgs {
    /// Run identifier (a fresh ULID when omitted).
    #[clap(long)]
    pub run_id: Option<String>,
    /// Pull request number.
    #[clap(long = "pr")]
    pub pr_id: Option<i64>,
    /// Commit SHA under test.
    #[clap(long = "commit")]
    pub commit_sha: Option<String>,
    /// Event timestamp (epoch seconds with `Z` suffix when omitted).
    #[clap(long)]
    pub timestamp: Option<String>,
    /// Attribute every case to this component instead of the configured rules.
    #[clap(long)]
    pub component: Option<String>,
    /// Ingest a report even when identical bytes were ingested before.
    #[clap(long)]
    pub allow_duplicate: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct IngestCli {
    #[clap(subcommand)]
    pub command: IngestCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum IngestCommand {
    /// Append JUnit-style XML reports to the store.
    Report {
        /// Report files.
        #[clap(required = true)]
        files: Vec<PathBuf>,
        #[clap(flatten)]
        context: RunContextArgs,
        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the canonical command list of a manifest.
    Manifest {
        file: PathBuf,
        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct CheckCli {
    /// Manifest of executed commands.
    #[clap(long)]
    pub executed: PathBuf,
    /// Required command (repeatable). Defaults to `[compliance].required`.
    #[clap(long)]
    pub required: Vec<String>,
    /// Overrides `[compliance].mode`.
    #[clap(long, value_enum)]
    pub mode: Option<ComplianceMode>,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ChangedArgs {
    /// Changed component (repeatable and/or comma-separated).
    #[clap(long, value_delimiter = ',')]
    pub changed: Vec<String>,
    /// Changed file path, mapped to components via `[[components]]` (repeatable).
    #[clap(long = "changed-file")]
    pub changed_files: Vec<String>,
    /// Send warnings through the configured notification channels.
    #[clap(long)]
    pub notify: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct GuidanceCli {
    #[clap(subcommand)]
    pub command: GuidanceCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum GuidanceCommand {
    /// List guidance rules.
    List {
        /// Include retired rules.
        #[clap(long)]
        all: bool,
        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Warnings for the components a change touches.
    Warn {
        #[clap(flatten)]
        changed: ChangedArgs,
        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Markdown section for contributor docs.
    Section {
        /// Heading text (defaults to `[guidance].section_title`).
        #[clap(long)]
        title: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct PipelineCli {
    /// Report files to ingest before recomputing (repeatable).
    #[clap(long = "report")]
    pub reports: Vec<PathBuf>,
    #[clap(flatten)]
    pub context: RunContextArgs,
    #[clap(flatten)]
    pub changed: ChangedArgs,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
