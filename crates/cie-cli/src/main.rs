//! CIE - index a repository into a queryable knowledge graph.
//!
//! # Usage
//!
//! ```bash
//! # Create .cie/project.yaml
//! cie init
//!
//! # Index (incremental by default)
//! cie index
//! cie index --full
//! cie index --queue --until <commit>
//!
//! # Search functions semantically
//! cie query "parse configuration file"
//!
//! # Show project and store state
//! cie status
//!
//! # Drop the store and checkpoints
//! cie reset --yes
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cie_core::error::ErrorReport;

mod commands;

/// CIE - code intelligence engine
#[derive(Parser, Debug)]
#[command(name = "cie")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Repository root (defaults to the nearest ancestor with .cie/project.yaml)
    #[arg(long, short = 'C', global = true, env = "CIE_REPO")]
    repo: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create .cie/project.yaml in the current repository
    Init(commands::init::InitArgs),

    /// Index the repository (incremental by default)
    Index(commands::index::IndexArgs),

    /// Search indexed functions semantically, or run a raw Datalog script
    Query(commands::query::QueryArgs),

    /// Show project, store and queue state
    Status(commands::status::StatusArgs),

    /// Delete the store and checkpoints for this project
    Reset(commands::reset::ResetArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Command errors carry their own classification; they map onto the
    // stable exit-code taxonomy instead of anyhow's generic failure.
    let result: std::result::Result<(), ErrorReport> = match cli.command {
        Commands::Init(args) => commands::init::execute(args, &cli.global).await,
        Commands::Index(args) => commands::index::execute(args, &cli.global).await,
        Commands::Query(args) => commands::query::execute(args, &cli.global).await,
        Commands::Status(args) => commands::status::execute(args, &cli.global).await,
        Commands::Reset(args) => commands::reset::execute(args, &cli.global).await,
    };

    if let Err(report) = result {
        eprintln!("{}", report.render());
        std::process::exit(report.exit_code());
    }
    Ok(())
}
