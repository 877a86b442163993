//! Sinkgate CLI
//!
//! Command-line interface for the domain-blocking DNS gateway.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    logging::init(&args)?;

    // Run the main logic
    let result = run(args).await;

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = commands::load_config(args.config.as_deref())?;

    match args.command {
        commands::Command::Run(run_args) => commands::run::execute(run_args, config).await,
        commands::Command::Domains(domains_args) => {
            commands::domains::execute(domains_args, config).await
        }
        commands::Command::Config(config_args) => commands::config::execute(config_args, config),
    }
}
