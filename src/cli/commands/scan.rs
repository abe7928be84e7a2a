//! One-shot signal scan over a CSV candle file.

use anyhow::{bail, Result};
use perp_config::load_config;
use perp_core::traits::MarketData;
use perp_data::{load_csv, MarketHub};
use perp_signals::SignalDetector;
use std::path::Path;
use std::sync::Arc;

use crate::cli::ScanArgs;

pub async fn run(args: ScanArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let detector_settings = config.strategy.detector.clone();

    let series = load_csv(&args.data, &args.symbol, detector_settings.mid_timeframe)?;
    let Some(last) = series.last() else {
        bail!("No candles in {}", args.data.display());
    };
    // Evaluate just past the newest candle so it counts as confirmed
    let now_ms = last.open_time + detector_settings.mid_timeframe.as_millis();

    let hub = Arc::new(MarketHub::new(series.len()));
    hub.replace_series(series).await;
    let detector = SignalDetector::new(
        detector_settings,
        config.strategy.filters.clone(),
        Arc::clone(&hub) as Arc<dyn MarketData>,
    )?;

    match detector.detect_at(&args.symbol, now_ms).await? {
        Some(signal) if args.json => println!("{}", serde_json::to_string_pretty(&signal)?),
        Some(signal) => {
            println!("{} {:?} {:?}", signal.symbol, signal.kind, signal.direction);
            println!("  price:    {}", signal.price);
            println!("  strength: {:.4}%", signal.strength_pct);
        }
        None => println!("No signal on the last confirmed candle."),
    }
    Ok(())
}
