//! Scriptloom CLI
//!
//! Developer tool for compiling, validating, and dry-running automation
//! graphs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Scriptloom - automation graph to script bundle compiler
#[derive(Parser)]
#[command(name = "scriptloom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a graph document (or every graph in a directory)
    Compile {
        /// Graph file (.json/.yaml) or directory of graphs
        graph: String,

        /// Output directory for bundles
        #[arg(short, long, default_value = "./out")]
        out: String,

        /// Write even when the bundle hash is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Validate a graph without writing a bundle
    Validate {
        /// Graph file (.json/.yaml)
        graph: String,
    },

    /// List supported operations and their capability requirements
    Ops,

    /// Compile a graph and execute it against fixture responses
    DryRun {
        /// Graph file (.json/.yaml)
        graph: String,

        /// Fixture file: seeded properties and queued HTTP responses
        #[arg(short, long)]
        fixtures: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Compile { graph, out, force } => {
            commands::compile::run(&graph, &out, force)?;
        }
        Commands::Validate { graph } => {
            commands::validate::run(&graph)?;
        }
        Commands::Ops => {
            commands::ops::run()?;
        }
        Commands::DryRun { graph, fixtures } => {
            commands::dry_run::run(&graph, fixtures.as_deref())?;
        }
    }

    Ok(())
}
