//! Sustained-trend detection across two timeframes.

use perp_core::traits::{Indicator, MultiOutputIndicator};
use perp_core::types::PositionSide;
use perp_indicators::{EmaSpread, Sma};

/// A sustained-trend event.
#[derive(Debug, Clone, Copy)]
pub struct TrendEvent {
    /// Direction of the established trend
    pub direction: PositionSide,
    /// Slow-timeframe spread strength, percent
    pub strength_pct: f64,
}

/// Established-trend check: the slow timeframe carries a trend of
/// sufficient strength while the fast timeframe's absolute EMA spread has
/// expanded monotonically over the last few candles, and price agrees with
/// a medium moving average on the reference timeframe.
#[derive(Debug, Clone)]
pub struct SustainedTrendCheck {
    spread: EmaSpread,
    mid_ma: Sma,
    min_strength_pct: f64,
    expansion_candles: usize,
}

impl SustainedTrendCheck {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        mid_period: usize,
        min_strength_pct: f64,
        expansion_candles: usize,
    ) -> Self {
        Self {
            spread: EmaSpread::new(fast_period, slow_period),
            mid_ma: Sma::new(mid_period),
            min_strength_pct,
            expansion_candles,
        }
    }

    /// Evaluate against confirmed closes of the slow timeframe (trend), the
    /// fast timeframe (expansion), and the reference timeframe (MA
    /// consistency), plus the latest confirmed price.
    pub fn evaluate(
        &self,
        slow_tf_closes: &[f64],
        fast_tf_closes: &[f64],
        reference_closes: &[f64],
        price: f64,
    ) -> Option<TrendEvent> {
        let trend = self.spread.calculate(slow_tf_closes);
        let last = trend.last()?;
        let strength_pct = last.strength_pct();
        if strength_pct < self.min_strength_pct {
            return None;
        }
        let direction = if last.fast_above() {
            PositionSide::Long
        } else {
            PositionSide::Short
        };

        if !self.is_expanding(fast_tf_closes) {
            return None;
        }

        // EMA+MA consistency: price must sit on the trend's side of the
        // medium moving average.
        let ma = self.mid_ma.calculate(reference_closes);
        let ma_last = *ma.last()?;
        let consistent = match direction {
            PositionSide::Long => price > ma_last,
            PositionSide::Short => price < ma_last,
        };
        if !consistent {
            return None;
        }

        Some(TrendEvent {
            direction,
            strength_pct,
        })
    }

    /// Absolute spread strictly increasing over the last N candles.
    fn is_expanding(&self, closes: &[f64]) -> bool {
        let points = self.spread.calculate(closes);
        if points.len() < self.expansion_candles {
            return false;
        }
        let tail = &points[points.len() - self.expansion_candles..];
        tail.windows(2).all(|w| w[1].strength_pct() > w[0].strength_pct())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accelerating_uptrend(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64).powf(1.6) * 0.05)
            .collect()
    }

    #[test]
    fn test_accelerating_trend_fires_long() {
        let slow = accelerating_uptrend(60);
        let fast = accelerating_uptrend(60);
        let reference = accelerating_uptrend(60);
        let price = *reference.last().unwrap();

        let check = SustainedTrendCheck::new(9, 26, 20, 0.1, 4);
        let event = check.evaluate(&slow, &fast, &reference, price).unwrap();
        assert_eq!(event.direction, PositionSide::Long);
        assert!(event.strength_pct >= 0.1);
    }

    #[test]
    fn test_flat_fast_timeframe_blocks() {
        let slow = accelerating_uptrend(60);
        let fast = vec![100.0; 60];
        let reference = accelerating_uptrend(60);
        let price = *reference.last().unwrap();

        let check = SustainedTrendCheck::new(9, 26, 20, 0.1, 4);
        assert!(check.evaluate(&slow, &fast, &reference, price).is_none());
    }

    #[test]
    fn test_price_below_ma_blocks_long() {
        let slow = accelerating_uptrend(60);
        let fast = accelerating_uptrend(60);
        let reference = accelerating_uptrend(60);
        // Price has collapsed under the medium MA
        let price = 90.0;

        let check = SustainedTrendCheck::new(9, 26, 20, 0.1, 4);
        assert!(check.evaluate(&slow, &fast, &reference, price).is_none());
    }

    #[test]
    fn test_weak_trend_blocks() {
        let slow = accelerating_uptrend(60);
        let fast = accelerating_uptrend(60);
        let reference = accelerating_uptrend(60);
        let price = *reference.last().unwrap();

        let check = SustainedTrendCheck::new(9, 26, 20, 50.0, 4);
        assert!(check.evaluate(&slow, &fast, &reference, price).is_none());
    }
}
