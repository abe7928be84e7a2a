//! Live trading command.

use anyhow::Result;
use perp_config::load_config;
use perp_core::traits::{AccountRepository, ExchangeGateway, MarketData, PositionRepository};
use perp_data::MarketHub;
use perp_engine::{ExecutionEngine, LedgerSide};
use perp_exchange::{MarketFeed, PaperExchange, RestExchange};
use perp_ledger::{Blacklist, MemoryAccountLedger, MemoryAuditLog, MemoryPositionLedger};
use perp_regime::RegimeGate;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::runtime;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    info!(app = %config.app.name, environment = %config.app.environment, "Starting live engine");

    let hub = Arc::new(MarketHub::new(config.strategy.detector.candle_limit));
    let data: Arc<dyn MarketData> = Arc::clone(&hub) as Arc<dyn MarketData>;

    let rest: Arc<dyn ExchangeGateway> = Arc::new(RestExchange::new(&config.exchange)?);
    let primary = LedgerSide {
        gateway: rest,
        positions: Arc::new(MemoryPositionLedger::new()) as Arc<dyn PositionRepository>,
        // The venue holds the real balance; this ledger tracks the slice
        // of it the engine is allowed to commit
        account: Arc::new(MemoryAccountLedger::new(config.exchange.paper_capital))
            as Arc<dyn AccountRepository>,
    };

    let mirror = if config.exchange.mirror_to_paper {
        let paper: Arc<dyn ExchangeGateway> =
            Arc::new(PaperExchange::new(Arc::clone(&data)));
        Some(LedgerSide {
            gateway: paper,
            positions: Arc::new(MemoryPositionLedger::new()) as Arc<dyn PositionRepository>,
            account: Arc::new(MemoryAccountLedger::new(config.exchange.paper_capital))
                as Arc<dyn AccountRepository>,
        })
    } else {
        None
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
        mirror,
        Arc::new(MemoryAuditLog::new()),
        Arc::new(Blacklist::new()),
    )?);

    let feed = MarketFeed::new(&config.exchange)?;
    runtime::run_loop(&config, hub, engine, feed).await
}
