//! layersync: keeps hosted feature layers in step with database queries.
//!
//! # Usage
//!
//! ```text
//! layersync start [--config <path>]
//! layersync stop
//! layersync status [--json]
//! layersync check [--config <path>]
//! layersync preview <layer> [--config <path>] [--limit <n>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, preview::PreviewArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "layersync",
    version,
    about = "Sync relational query results into hosted feature layers",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every configured layer worker in the foreground.
    Start(commands::ConfigArg),

    /// Ask a running instance to shut down.
    Stop,

    /// Show per-layer worker status of a running instance.
    Status(StatusArgs),

    /// Validate the configuration and list the layers that would run.
    Check(CheckArgs),

    /// Print the features a layer's first cycle would add, without contacting
    /// the remote service.
    Preview(PreviewArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => commands::daemon::start(args),
        Commands::Stop => commands::daemon::stop(),
        Commands::Status(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Preview(args) => args.run(),
    }
}
