//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand};
use perp_config::LoggingConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "perp")]
#[command(author, version, about = "Automated perpetual-futures trading engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    /// Write logs to a daily-rolled file
    #[arg(long)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn logging_overrides(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: if self.json_logs { "json" } else { "pretty" }.to_string(),
            file: self.log_file.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trade live through the REST gateway, mirroring to paper when configured
    Run,
    /// Trade on the paper venue against live market data
    Paper(PaperArgs),
    /// One-shot signal scan over a CSV candle file
    Scan(ScanArgs),
    /// Validate configuration
    ValidateConfig,
}

#[derive(clap::Args)]
pub struct PaperArgs {
    /// Override the starting paper capital
    #[arg(long)]
    pub capital: Option<rust_decimal::Decimal>,
}

#[derive(clap::Args)]
pub struct ScanArgs {
    /// CSV candle file (open_time, open, high, low, close, volume)
    #[arg(long)]
    pub data: PathBuf,

    /// Symbol the file covers
    #[arg(short, long)]
    pub symbol: String,

    /// Print the detected signal as JSON
    #[arg(long)]
    pub json: bool,
}
