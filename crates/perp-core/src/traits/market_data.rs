//! Market data trait seam.

use crate::error::DataError;
use crate::types::{CandleSeries, Timeframe};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// 24-hour price envelope for a symbol, used by the anti-chase filter and
/// the volatility profile.
#[derive(Debug, Clone, Copy)]
pub struct Range24h {
    /// Highest trade in the window
    pub high: Decimal,
    /// Lowest trade in the window
    pub low: Decimal,
}

impl Range24h {
    /// Where `price` sits inside the window, 0.0 at the low, 1.0 at the
    /// high. Degenerate windows report the midpoint.
    pub fn percentile(&self, price: Decimal) -> f64 {
        let span = self.high - self.low;
        if span <= Decimal::ZERO {
            return 0.5;
        }
        let p: f64 = ((price - self.low) / span).try_into().unwrap_or(0.5);
        p.clamp(0.0, 1.0)
    }

    /// Window width as a percent of the low.
    pub fn width_pct(&self) -> f64 {
        if self.low <= Decimal::ZERO {
            return 0.0;
        }
        ((self.high - self.low) / self.low * Decimal::from(100))
            .try_into()
            .unwrap_or(0.0)
    }
}

/// Read-only market data access: current price plus recent candles.
///
/// Backed by a periodic pull and a push price feed. Missing data is a
/// `None`, not an error; callers skip the evaluation and retry next tick.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest traded price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<Option<Decimal>, DataError>;

    /// Last `limit` candles for a symbol and timeframe, oldest first. The
    /// newest candle may still be forming.
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Option<CandleSeries>, DataError>;

    /// 24-hour high/low for a symbol.
    async fn range_24h(&self, symbol: &str) -> Result<Option<Range24h>, DataError>;

    /// Get the data source name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_range_percentile() {
        let range = Range24h {
            high: dec!(110),
            low: dec!(100),
        };
        assert!((range.percentile(dec!(100)) - 0.0).abs() < 1e-9);
        assert!((range.percentile(dec!(110)) - 1.0).abs() < 1e-9);
        assert!((range.percentile(dec!(105)) - 0.5).abs() < 1e-9);
        assert!((range.percentile(dec!(120)) - 1.0).abs() < 1e-9); // clamped
        assert!((range.width_pct() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_range() {
        let range = Range24h {
            high: dec!(100),
            low: dec!(100),
        };
        assert!((range.percentile(dec!(100)) - 0.5).abs() < 1e-9);
    }
}
