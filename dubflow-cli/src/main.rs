//! # Dubflow CLI
//!
//! Command-line front end for the dubflow pipeline engine. Plans and runs
//! series, exports and reconciles review mirrors, and aggregates QA reports.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    handle_plan_command, handle_qa_command, handle_review_command, handle_run_command, Roots,
};

#[derive(Parser, Debug)]
#[command(name = "dubflow")]
#[command(about = "Localization and TTS pipeline for episodic audio series")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Source document tree root (default: $SERIES_SOURCE_DIR, then ./origin)
    #[arg(long, global = true, value_name = "DIR")]
    source_root: Option<PathBuf>,

    /// Processed artifact tree root (default: $SERIES_OUTPUT_DIR, then ./processed)
    #[arg(long, global = true, value_name = "DIR")]
    output_root: Option<PathBuf>,

    /// Review mirror tree root (default: $SERIES_REVIEW_DIR, then <output>/_review)
    #[arg(long, global = true, value_name = "DIR")]
    review_root: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan and execute a pipeline run for one source document
    Run(RunArgs),

    /// Print the execution plan without running anything
    Plan(PlanArgs),

    /// Review mirror operations
    #[command(subcommand)]
    Review(ReviewCommands),

    /// Quality report operations
    #[command(subcommand)]
    Qa(QaCommands),
}

/// Arguments shared by `run` and `plan`.
#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Source document, absolute or relative to the source root
    #[arg(value_name = "SOURCE_FILE")]
    pub source_file: PathBuf,

    /// Comma-separated target languages (default: korean,japanese)
    #[arg(long, value_name = "LIST")]
    pub langs: Option<String>,

    /// Comma-separated stage tokens to skip, e.g. 5,6,6a,7
    #[arg(long, value_name = "LIST")]
    pub skip: Option<String>,

    /// Cap the number of episodes produced by the split stage
    #[arg(long, value_name = "N")]
    pub max_episodes: Option<u32>,

    /// Re-run every stage even when a satisfying artifact exists
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Seconds to wait between external API calls (default: 6.0)
    #[arg(long, value_name = "SECS")]
    pub rate_limit: Option<f64>,

    /// Halt the run after the first failed cell
    #[arg(long)]
    pub stop_on_error: bool,

    /// Copy the preset audio configuration instead of deriving one
    #[arg(long)]
    pub use_preset_audio: bool,

    /// Mastering peak target in dBFS (default: -3.0)
    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    pub peak_db: Option<f32>,

    /// Mastering RMS target in dBFS (default: -20.0)
    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    pub rms_db: Option<f32>,

    /// Reuse satisfied stages without prompting
    #[arg(long)]
    pub auto: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Print the plan as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum ReviewCommands {
    /// Export one stage cell into the editable review mirror
    Export {
        /// Series directory under the output root
        #[arg(value_name = "SERIES_DIR")]
        series_dir: PathBuf,

        /// Stage token, e.g. 1, 2, 2a
        #[arg(long, value_name = "STAGE")]
        stage: String,

        /// Language cell, required for per-language stages
        #[arg(long, value_name = "LANG")]
        lang: Option<String>,
    },

    /// Apply edited review files back onto the canonical store
    Sync {
        /// Merged review document, or a review cell folder
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum QaCommands {
    /// Aggregate gate reports and write the series QA summary
    Report {
        /// Series directory under the output root
        #[arg(value_name = "SERIES_DIR")]
        series_dir: PathBuf,

        /// Comma-separated languages to aggregate (default: korean,japanese)
        #[arg(long, value_name = "LIST")]
        langs: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(log_level)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_target(false)
            .init();
    }

    let roots = Roots::resolve(cli.source_root, cli.output_root, cli.review_root);

    match cli.command {
        Commands::Run(args) => handle_run_command(args, &roots).await,
        Commands::Plan(args) => handle_plan_command(args, &roots),
        Commands::Review(cmd) => handle_review_command(cmd, &roots),
        Commands::Qa(cmd) => handle_qa_command(cmd),
    }
}
