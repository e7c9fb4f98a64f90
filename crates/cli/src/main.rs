//! `radar-node` - speed radar edge node and central aggregator

mod cli;
mod commands;
mod error;
mod node;

use anyhow::Result;
use clap::Parser;
use observability::LogSettings;
use tracing::info;

use cli::{Cli, Commands};
use commands::{
    run_central, run_compact, run_info, run_node, run_queue, run_requeue, run_validate,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional; flags documented with `env =` can be set there
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    observability::init_tracing(&LogSettings::for_verbosity(
        cli.log_format.into(),
        cli.verbose,
        cli.quiet,
    ))?;

    info!(version = env!("CARGO_PKG_VERSION"), command = cli.command.name(), "radar-node starting");

    let result = match &cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Queue(args) => run_queue(args).await,
        Commands::Requeue(args) => run_requeue(args).await,
        Commands::Compact(args) => run_compact(args).await,
        Commands::Central(args) => run_central(args).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = format!("{e:#}"), "Command failed");
    }
    result
}
