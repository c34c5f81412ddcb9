//! arc-fleet CLI.
//!
//! Plans and applies self-hosted runner infrastructure for the repositories
//! listed in a descriptor file.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::apply::ApplyCommand;
use commands::plan::{OutputsCommand, PlanCommand};

/// Runner fleet provisioning for Kubernetes.
#[derive(Parser)]
#[command(
    name = "arc-fleet",
    version,
    about = "Provision self-hosted CI runners for a fleet of repositories",
    long_about = "Build the cluster resources a fleet of repositories needs for\n\
                  self-hosted runners and converge them on a Kubernetes cluster.\n\n\
                  Applying is idempotent - re-running converges the same state."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resource graph in dependency order.
    Plan(PlanCommand),

    /// Print the outputs the fleet publishes, without applying anything.
    Outputs(OutputsCommand),

    /// Converge the resource graph on a cluster.
    Apply(ApplyCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info,arc_fleet=debug")
    } else {
        EnvFilter::new("warn,arc_fleet=info")
    };

    // Logs go to stderr so plan/outputs stay machine-readable on stdout.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Plan(cmd) => cmd.run(),
        Commands::Outputs(cmd) => cmd.run(),
        Commands::Apply(cmd) => cmd.run().await,
    }
}
