//! Binary entry point for daybook.
//!
//! This binary provides the CLI interface for the daily journal, message
//! archive, lifelog and classifier flows.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{ClassifyArgs, MessagesArgs, cmd_classify, cmd_journal, cmd_lifelog, cmd_messages};
use daybook::config::DaybookConfig;
use daybook::observability;
use daybook::Shutdown;
use std::path::PathBuf;
use std::process::ExitCode;

/// Daybook - incremental maintenance for a personal knowledge base.
#[derive(Parser)]
#[command(name = "daybook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Prepare today's note: reference, carried tasks, summaries.
    Journal,

    /// Sync the saved-message archive.
    Messages(MessagesArgs),

    /// Sync lifelogs since the last run.
    Lifelog {
        /// Fetch from this date (YYYY-MM-DD) to today in weekly windows.
        #[arg(long, value_name = "DATE")]
        backfill_from: Option<NaiveDate>,
    },

    /// Classify archived messages against pattern definitions.
    Classify(ClassifyArgs),
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match DaybookConfig::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(e.exit_code());
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let shutdown = Shutdown::new();
    if let Err(e) = shutdown.install_signal_handler() {
        tracing::warn!(error = %e, "Ctrl+C handler not installed");
    }

    match run_command(cli.command, &config, &shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<daybook::Error>() {
            Some(daybook::Error::Cancelled) => {
                eprintln!("Interrupted");
                ExitCode::SUCCESS
            },
            Some(err) => {
                eprintln!("Error: {e:#}");
                ExitCode::from(err.exit_code())
            },
            None => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            },
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &DaybookConfig, shutdown: &Shutdown) -> anyhow::Result<()> {
    match command {
        Commands::Journal => cmd_journal(config, shutdown),
        Commands::Messages(args) => cmd_messages(config, args, shutdown),
        Commands::Lifelog { backfill_from } => cmd_lifelog(config, backfill_from, shutdown),
        Commands::Classify(args) => cmd_classify(config, args, shutdown),
    }
}
