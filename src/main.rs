//! VarFish sample index main executable

pub mod breakend;
pub mod common;
pub mod executor;
pub mod index;
pub mod query;
pub mod sample_index;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "VarFish sample index queries",
    long_about = "This tool plans and runs variant queries against the per-sample variant index"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Sample index related commands.
    SampleIndex(SampleIndex),
}

/// Parsing of "sample-index *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct SampleIndex {
    /// The sub command to run
    #[command(subcommand)]
    command: SampleIndexCommands,
}

/// Enum supporting the parsing of "sample-index *" sub commands.
#[derive(Debug, Subcommand)]
enum SampleIndexCommands {
    Query(sample_index::cli::Args),
    Plan(sample_index::cli::PlanArgs),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::SampleIndex(sample_index) => match &sample_index.command {
                SampleIndexCommands::Query(args) => sample_index::cli::run(&cli.common, args)?,
                SampleIndexCommands::Plan(args) => {
                    sample_index::cli::run_plan(&cli.common, args)?
                }
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
