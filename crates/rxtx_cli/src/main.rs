//! rxtx CLI
//!
//! Runs the person / person event demonstrations against the in-memory
//! backends and prints the outcome together with the committed rows.
//!
//! # Commands
//!
//! - `run` - Run a scenario in one demarcation mode
//! - `cancel` - Cancel an async scenario while it is in flight
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// rxtx transaction coordination demonstrations.
#[derive(Parser)]
#[command(name = "rxtx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend to run against (relational, document, graph); all if omitted
    #[arg(global = true, short, long)]
    backend: Option<String>,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario in one demarcation mode
    Run {
        /// Demarcation mode (auto-commit, explicit, declarative)
        #[arg(short, long, default_value = "explicit")]
        mode: String,

        /// Scenario (dependent, unique)
        #[arg(short, long, default_value = "dependent")]
        scenario: String,

        /// Commit the first two steps before running the rest
        #[arg(long)]
        seeded: bool,
    },

    /// Cancel an async scenario while it is in flight
    Cancel {
        /// Demarcation mode (auto-commit, explicit, declarative)
        #[arg(short, long, default_value = "explicit")]
        mode: String,

        /// Simulated latency of every store round trip, in milliseconds
        #[arg(short, long, default_value = "10")]
        latency_ms: u64,

        /// Delay before cancellation is signalled, in milliseconds
        #[arg(short, long, default_value = "25")]
        after_ms: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backends = commands::parse_backends(cli.backend.as_deref())?;
    match cli.command {
        Commands::Run {
            mode,
            scenario,
            seeded,
        } => {
            let mode = commands::parse_mode(&mode)?;
            commands::run::run(&backends, mode, &scenario, seeded, &cli.format)?;
        }
        Commands::Cancel {
            mode,
            latency_ms,
            after_ms,
        } => {
            let mode = commands::parse_mode(&mode)?;
            commands::cancel::run(&backends, mode, latency_ms, after_ms, &cli.format)?;
        }
        Commands::Version => {
            println!("rxtx CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("rxtx Core v{}", rxtx_core::VERSION);
        }
    }

    Ok(())
}
