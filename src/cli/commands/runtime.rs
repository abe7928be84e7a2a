//! Shared runtime wiring for the trading commands.

use anyhow::Result;
use perp_config::AppConfig;
use perp_data::MarketHub;
use perp_engine::ExecutionEngine;
use perp_exchange::MarketFeed;
use perp_monitor::MonitorSupervisor;
use perp_core::types::Timeframe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the engine until interrupted: poll market data, scan for entries,
/// keep the monitor fleet healthy. Prints a final account snapshot on exit.
pub async fn run_loop(
    config: &AppConfig,
    hub: Arc<MarketHub>,
    engine: Arc<ExecutionEngine>,
    feed: MarketFeed,
) -> Result<()> {
    let strategy = &config.strategy;
    let poll = Duration::from_secs(strategy.monitor_interval_secs);

    // The regime basket needs candles too, not just the traded symbols
    let mut symbols = strategy.symbols.clone();
    for member in &strategy.regime.basket {
        if !symbols.contains(member) {
            symbols.push(member.clone());
        }
    }
    let mut timeframes = vec![
        strategy.detector.fast_timeframe,
        strategy.detector.mid_timeframe,
        strategy.detector.slow_timeframe,
    ];
    timeframes.dedup();

    let feed_task = tokio::spawn(feed_loop(
        feed,
        Arc::clone(&hub),
        symbols,
        timeframes,
        strategy.detector.candle_limit,
        poll,
    ));

    let supervisor = Arc::new(MonitorSupervisor::new(Arc::clone(&engine)));
    let resumed = supervisor.resume().await?;
    if resumed > 0 {
        info!(resumed, "Monitors resumed for open positions");
    }

    let mut scan = tokio::time::interval(poll);
    scan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut health =
        tokio::time::interval(Duration::from_secs(strategy.health_check_interval_secs));
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = scan.tick() => supervisor.scan_cycle().await,
            _ = health.tick() => {
                if let Err(e) = supervisor.health_check().await {
                    warn!(error = %e, "Health check failed");
                }
            }
        }
    }

    info!("Shutting down");
    feed_task.abort();
    supervisor.shutdown().await;

    let snapshot = engine.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Poll tickers and candle history into the hub. Failures skip the symbol
/// until the next round.
async fn feed_loop(
    feed: MarketFeed,
    hub: Arc<MarketHub>,
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    candle_limit: usize,
    poll: Duration,
) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        for symbol in &symbols {
            match feed.ticker(symbol).await {
                Ok(t) => {
                    hub.update_price(symbol, t.last).await;
                    hub.update_range_24h(symbol, t.range_24h).await;
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "Ticker poll failed");
                    continue;
                }
            }
            for timeframe in &timeframes {
                match feed.candles(symbol, *timeframe, candle_limit).await {
                    Ok(series) => hub.replace_series(series).await,
                    Err(e) => {
                        warn!(%symbol, %timeframe, error = %e, "Candle poll failed")
                    }
                }
            }
        }
    }
}
