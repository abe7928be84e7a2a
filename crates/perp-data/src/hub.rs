//! In-memory market data hub.
//!
//! The hub is the single cache the rest of the workspace reads through. It
//! is filled by whatever feed is wired in (exchange poller, push ticker,
//! CSV replay) and handed to consumers as an `Arc<MarketHub>`, so detectors
//! and monitors never talk to a feed directly.

use perp_core::error::DataError;
use perp_core::traits::{MarketData, Range24h};
use perp_core::types::{Candle, CandleSeries, Timeframe};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

fn series_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("{}_{}", symbol, timeframe)
}

/// Shared in-memory price and candle store.
pub struct MarketHub {
    prices: RwLock<HashMap<String, Decimal>>,
    series: RwLock<HashMap<String, CandleSeries>>,
    ranges: RwLock<HashMap<String, Range24h>>,
    /// Candles retained per (symbol, timeframe)
    capacity: usize,
}

impl MarketHub {
    /// Create a hub retaining `capacity` candles per symbol and timeframe.
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            series: RwLock::new(HashMap::new()),
            ranges: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Record the latest traded price for a symbol.
    pub async fn update_price(&self, symbol: &str, price: Decimal) {
        trace!(symbol, %price, "Price update");
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Append one candle. A candle with the open time of the newest stored
    /// entry replaces it, so forming-candle refreshes are safe to push.
    pub async fn push_candle(&self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        let key = series_key(symbol, timeframe);
        let mut series = self.series.write().await;
        series
            .entry(key)
            .or_insert_with(|| CandleSeries::with_capacity(symbol, timeframe, self.capacity))
            .push(candle);
    }

    /// Replace the whole series for a symbol and timeframe, e.g. after a
    /// bulk history fetch or a CSV replay load.
    pub async fn replace_series(&self, series: CandleSeries) {
        let key = series_key(&series.symbol, series.timeframe);
        self.series.write().await.insert(key, series);
    }

    /// Record the 24-hour high/low envelope for a symbol.
    pub async fn update_range_24h(&self, symbol: &str, range: Range24h) {
        self.ranges.write().await.insert(symbol.to_string(), range);
    }

    /// Drop all cached data for a symbol.
    pub async fn evict(&self, symbol: &str) {
        self.prices.write().await.remove(symbol);
        self.ranges.write().await.remove(symbol);
        let prefix = format!("{}_", symbol);
        self.series
            .write()
            .await
            .retain(|k, _| !k.starts_with(&prefix));
    }
}

#[async_trait]
impl MarketData for MarketHub {
    async fn current_price(&self, symbol: &str) -> Result<Option<Decimal>, DataError> {
        Ok(self.prices.read().await.get(symbol).copied())
    }

    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Option<CandleSeries>, DataError> {
        let key = series_key(symbol, timeframe);
        let series = self.series.read().await;
        let Some(stored) = series.get(&key) else {
            return Ok(None);
        };
        if stored.is_empty() {
            return Ok(None);
        }
        let mut out = CandleSeries::new(symbol, timeframe);
        out.extend(stored.last_n(limit).into_iter().copied());
        Ok(Some(out))
    }

    async fn range_24h(&self, symbol: &str) -> Result<Option<Range24h>, DataError> {
        Ok(self.ranges.read().await.get(symbol).copied())
    }

    fn name(&self) -> &str {
        "memory-hub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(i: i64, close: f64) -> Candle {
        Candle::new(i * 300_000, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[tokio::test]
    async fn test_price_roundtrip() {
        let hub = MarketHub::new(100);
        assert!(hub.current_price("BTC-USDT-SWAP").await.unwrap().is_none());

        hub.update_price("BTC-USDT-SWAP", dec!(43000.5)).await;
        assert_eq!(
            hub.current_price("BTC-USDT-SWAP").await.unwrap(),
            Some(dec!(43000.5))
        );
    }

    #[tokio::test]
    async fn test_candles_respect_limit() {
        let hub = MarketHub::new(100);
        for i in 0..10 {
            hub.push_candle(
                "ETH-USDT-SWAP",
                Timeframe::Minute5,
                candle(i, 2000.0 + i as f64),
            )
            .await;
        }

        let series = hub
            .candles("ETH-USDT-SWAP", Timeframe::Minute5, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(series.len(), 3);
        assert!((series.last().unwrap().close - 2009.0).abs() < 1e-9);
        assert!((series.get(0).unwrap().close - 2007.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_forming_candle_replaced_not_appended() {
        let hub = MarketHub::new(100);
        hub.push_candle("BTC-USDT-SWAP", Timeframe::Minute5, candle(0, 100.0))
            .await;
        hub.push_candle(
            "BTC-USDT-SWAP",
            Timeframe::Minute5,
            Candle::new(0, 100.0, 102.0, 99.0, 101.5, 20.0),
        )
        .await;

        let series = hub
            .candles("BTC-USDT-SWAP", Timeframe::Minute5, 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(series.len(), 1);
        assert!((series.last().unwrap().close - 101.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_timeframes_are_isolated() {
        let hub = MarketHub::new(100);
        hub.push_candle("BTC-USDT-SWAP", Timeframe::Minute5, candle(0, 100.0))
            .await;

        assert!(hub
            .candles("BTC-USDT-SWAP", Timeframe::Minute15, 10)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_evict_clears_symbol() {
        let hub = MarketHub::new(100);
        hub.update_price("BTC-USDT-SWAP", dec!(43000)).await;
        hub.update_price("ETH-USDT-SWAP", dec!(2200)).await;
        hub.push_candle("BTC-USDT-SWAP", Timeframe::Minute5, candle(0, 100.0))
            .await;

        hub.evict("BTC-USDT-SWAP").await;
        assert!(hub.current_price("BTC-USDT-SWAP").await.unwrap().is_none());
        assert!(hub
            .candles("BTC-USDT-SWAP", Timeframe::Minute5, 10)
            .await
            .unwrap()
            .is_none());
        assert!(hub.current_price("ETH-USDT-SWAP").await.unwrap().is_some());
    }
}
