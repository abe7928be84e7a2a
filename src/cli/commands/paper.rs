//! Paper trading command: live market data, simulated fills.

use anyhow::Result;
use perp_config::load_config;
use perp_core::traits::{AccountRepository, ExchangeGateway, MarketData, PositionRepository};
use perp_data::MarketHub;
use perp_engine::{ExecutionEngine, LedgerSide};
use perp_exchange::{MarketFeed, PaperExchange};
use perp_ledger::{Blacklist, MemoryAccountLedger, MemoryAuditLog, MemoryPositionLedger};
use perp_regime::RegimeGate;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::runtime;
use crate::cli::PaperArgs;

pub async fn run(args: PaperArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let capital = args.capital.unwrap_or(config.exchange.paper_capital);
    info!(app = %config.app.name, %capital, "Starting paper engine");

    let hub = Arc::new(MarketHub::new(config.strategy.detector.candle_limit));
    let data: Arc<dyn MarketData> = Arc::clone(&hub) as Arc<dyn MarketData>;

    let paper: Arc<dyn ExchangeGateway> = Arc::new(PaperExchange::new(Arc::clone(&data)));
    let primary = LedgerSide {
        gateway: paper,
        positions: Arc::new(MemoryPositionLedger::new()) as Arc<dyn PositionRepository>,
        account: Arc::new(MemoryAccountLedger::new(capital)) as Arc<dyn AccountRepository>,
    };

    let regime = Arc::new(RegimeGate::new(
        config.strategy.regime.clone(),
        config.strategy.detector.fast_period,
        config.strategy.detector.slow_period,
        Arc::clone(&data),
    ));
    let engine = Arc::new(ExecutionEngine::new(
        config.strategy.clone(),
        data,
        regime,
        primary,
        None,
        Arc::new(MemoryAuditLog::new()),
        Arc::new(Blacklist::new()),
    )?);

    let feed = MarketFeed::new(&config.exchange)?;
    runtime::run_loop(&config, hub, engine, feed).await
}
