//! Trend-strength measures built on moving averages.

use perp_core::traits::{Indicator, MultiOutputIndicator};
use serde::{Deserialize, Serialize};

use crate::moving_average::Ema;

/// One point of the fast/slow EMA pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpreadPoint {
    /// Fast EMA value
    pub fast: f64,
    /// Slow EMA value
    pub slow: f64,
}

impl SpreadPoint {
    /// Signed spread as a percent of the slow EMA. Positive when the fast
    /// EMA is above the slow one.
    pub fn spread_pct(&self) -> f64 {
        if self.slow == 0.0 {
            return 0.0;
        }
        (self.fast - self.slow) / self.slow * 100.0
    }

    /// Absolute spread percent, the trend-strength proxy.
    pub fn strength_pct(&self) -> f64 {
        self.spread_pct().abs()
    }

    /// Whether the fast EMA sits above the slow one.
    pub fn fast_above(&self) -> bool {
        self.fast > self.slow
    }
}

/// Fast/slow EMA spread series.
///
/// The spread percent is the workspace's trend-strength proxy: entry
/// strength, trend-weakening exits, and the sustained-trend expansion test
/// all read it.
#[derive(Debug, Clone)]
pub struct EmaSpread {
    fast_period: usize,
    slow_period: usize,
}

impl EmaSpread {
    /// Create a spread over the given EMA pair (fast < slow).
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        assert!(
            fast_period < slow_period,
            "Fast period must be less than slow period"
        );
        Self {
            fast_period,
            slow_period,
        }
    }
}

impl MultiOutputIndicator for EmaSpread {
    type Outputs = SpreadPoint;

    fn calculate(&self, data: &[f64]) -> Vec<SpreadPoint> {
        let fast = Ema::new(self.fast_period).calculate(data);
        let slow = Ema::new(self.slow_period).calculate(data);
        if slow.is_empty() {
            return vec![];
        }

        let offset = fast.len() - slow.len();
        slow.iter()
            .enumerate()
            .map(|(i, &s)| SpreadPoint {
                fast: fast[i + offset],
                slow: s,
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.slow_period
    }

    fn name(&self) -> &str {
        "EMA_SPREAD"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_sign_tracks_trend() {
        let spread = EmaSpread::new(3, 9);

        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = spread.calculate(&up);
        assert!(result.last().unwrap().fast_above());
        assert!(result.last().unwrap().spread_pct() > 0.0);

        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * 0.5).collect();
        let result = spread.calculate(&down);
        assert!(!result.last().unwrap().fast_above());
        assert!(result.last().unwrap().spread_pct() < 0.0);
    }

    #[test]
    fn test_strength_is_absolute() {
        let point = SpreadPoint {
            fast: 99.0,
            slow: 100.0,
        };
        assert!(point.spread_pct() < 0.0);
        assert!((point.strength_pct() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_market_has_no_spread() {
        let spread = EmaSpread::new(9, 26);
        let result = spread.calculate(&[100.0; 60]);
        assert!(result.iter().all(|p| p.strength_pct() < 1e-9));
    }
}
