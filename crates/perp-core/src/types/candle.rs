//! Candle (OHLCV) data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::Timeframe;

/// One OHLCV candle. Uses f64 for fast indicator math; the order path
/// converts to Decimal at the exchange boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, Unix milliseconds
    pub open_time: i64,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Traded volume (base units)
    pub volume: f64,
}

impl Candle {
    /// Create a new candle.
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Candle range (high - low).
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Body size (absolute open-to-close move).
    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Check if the candle closed above its open.
    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Check if the candle closed below its open.
    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Close time of the candle for a given timeframe, Unix milliseconds.
    #[inline]
    pub fn close_time(&self, timeframe: Timeframe) -> i64 {
        self.open_time + timeframe.as_millis()
    }

    /// Whether this candle is fully closed at `now_ms`. The still-forming
    /// candle is never used for crossover confirmation.
    #[inline]
    pub fn is_confirmed(&self, timeframe: Timeframe, now_ms: i64) -> bool {
        self.close_time(timeframe) <= now_ms
    }

    /// Open time as a DateTime.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.open_time)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
    }
}

/// Time-ordered candle container, oldest first. The newest entry may still
/// be forming; callers that need confirmed candles use the `confirmed_*`
/// accessors.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    /// Symbol identifier (e.g. "BTC-USDT-SWAP")
    pub symbol: String,
    /// Timeframe of the candles
    pub timeframe: Timeframe,
    candles: VecDeque<Candle>,
    /// Maximum retained candles (0 = unlimited)
    capacity: usize,
}

impl CandleSeries {
    /// Create a new empty series.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles: VecDeque::new(),
            capacity: 0,
        }
    }

    /// Create a series with a maximum capacity. Oldest candles are dropped
    /// once the capacity is reached.
    pub fn with_capacity(symbol: impl Into<String>, timeframe: Timeframe, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a candle. A candle with the same open time as the newest
    /// entry replaces it (in-progress candle refresh).
    pub fn push(&mut self, candle: Candle) {
        if let Some(last) = self.candles.back_mut() {
            if last.open_time == candle.open_time {
                *last = candle;
                return;
            }
        }
        if self.capacity > 0 && self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    /// Append multiple candles.
    pub fn extend(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for candle in candles {
            self.push(candle);
        }
    }

    /// Number of candles.
    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Check if the series is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Get a candle by index (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    /// The newest candle, confirmed or not.
    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// The last N candles, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<&Candle> {
        let start = self.candles.len().saturating_sub(n);
        self.candles.iter().skip(start).collect()
    }

    /// Number of candles fully closed at `now_ms`.
    pub fn confirmed_len(&self, now_ms: i64) -> usize {
        self.candles
            .iter()
            .take_while(|c| c.is_confirmed(self.timeframe, now_ms))
            .count()
    }

    /// The newest fully-closed candle at `now_ms`.
    pub fn confirmed(&self, now_ms: i64) -> Option<&Candle> {
        let n = self.confirmed_len(now_ms);
        if n == 0 {
            None
        } else {
            self.candles.get(n - 1)
        }
    }

    /// The last N confirmed candles, oldest first.
    pub fn confirmed_last_n(&self, n: usize, now_ms: i64) -> Vec<&Candle> {
        let confirmed = self.confirmed_len(now_ms);
        let start = confirmed.saturating_sub(n);
        self.candles.iter().take(confirmed).skip(start).collect()
    }

    /// Close prices of confirmed candles only, oldest first.
    pub fn confirmed_closes(&self, now_ms: i64) -> Vec<f64> {
        self.candles
            .iter()
            .take(self.confirmed_len(now_ms))
            .map(|c| c.close)
            .collect()
    }

    /// Extract close prices.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Extract high prices.
    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    /// Extract low prices.
    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    /// Extract volumes.
    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Iterate over the candles, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Clear all candles.
    pub fn clear(&mut self) {
        self.candles.clear();
    }
}
