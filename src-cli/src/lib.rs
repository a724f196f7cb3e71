//! Driftnet command-line shell
//!
//! This is the thin shell that parses arguments, installs logging and
//! dispatches to a subcommand. Scanning logic lives in the `crates/`
//! directory.

pub mod commands;
pub mod settings;

use clap::{Parser, Subcommand};
use tracing::info;

/// Resumable reconnaissance of publicly readable storage buckets.
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log every probe attempt
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe candidate names derived from seed-word lists.
    ///
    /// Progress is checkpointed into the state directory; running the same
    /// command again resumes where the previous run stopped.
    Scan(commands::scan::ScanArgs),

    /// Show research progress recorded in the state directory.
    Status(commands::status::StatusArgs),

    /// Consolidate per-chunk result records into one file.
    Merge(commands::merge::MergeArgs),

    /// Re-check that public entries of a consolidated file are still reachable.
    Validate(commands::validate::ValidateArgs),
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,driftnet=debug"
    } else {
        "info,driftnet=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Parse the command line and run the selected subcommand.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!("Starting driftnet v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Scan(args) => commands::scan::run(&args).await,
            Commands::Status(args) => commands::status::run(&args),
            Commands::Merge(args) => commands::merge::run(&args),
            Commands::Validate(args) => commands::validate::run(&args).await,
        }
    })
}
