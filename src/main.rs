//! Perpetual-futures trading engine CLI.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use perp_monitor::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = cli.logging_overrides();
    if let Commands::ValidateConfig = cli.command {
        // Validation prints its own report; keep stdout clean
        logging.level = "warn".to_string();
    }
    let _log_guard = setup_logging(&logging);

    match cli.command {
        Commands::Run => cli::commands::run::run(&cli.config).await,
        Commands::Paper(args) => cli::commands::paper::run(args, &cli.config).await,
        Commands::Scan(args) => cli::commands::scan::run(args, &cli.config).await,
        Commands::ValidateConfig => cli::commands::validate::run(&cli.config).await,
    }
}
