//! Momentum oscillators: RSI, MACD, KDJ.

use perp_core::traits::{Indicator, MultiOutputIndicator, OhlcvIndicator};
use serde::{Deserialize, Serialize};

use crate::moving_average::Ema;

/// Relative Strength Index (RSI).
///
/// Measures the speed and magnitude of recent price changes to flag
/// overbought and oversold conditions.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    /// Create a new RSI indicator. The common period is 14.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }

    /// Wilder's smoothing: avg = (prev_avg * (period-1) + value) / period.
    fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
        if values.len() < period {
            return vec![];
        }

        let mut result = Vec::with_capacity(values.len() - period + 1);
        let period_f64 = period as f64;

        let mut avg: f64 = values[..period].iter().sum::<f64>() / period_f64;
        result.push(avg);

        for &value in &values[period..] {
            avg = (avg * (period_f64 - 1.0) + value) / period_f64;
            result.push(avg);
        }

        result
    }
}

impl Indicator for Rsi {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() <= self.period {
            return vec![];
        }

        let mut gains = Vec::with_capacity(data.len() - 1);
        let mut losses = Vec::with_capacity(data.len() - 1);

        for i in 1..data.len() {
            let change = data[i] - data[i - 1];
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(-change);
            }
        }

        let avg_gains = Self::wilder_smooth(&gains, self.period);
        let avg_losses = Self::wilder_smooth(&losses, self.period);

        avg_gains
            .iter()
            .zip(avg_losses.iter())
            .map(|(&gain, &loss)| {
                if loss == 0.0 {
                    100.0
                } else {
                    100.0 - (100.0 / (1.0 + gain / loss))
                }
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "RSI"
    }
}

/// MACD output values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdOutput {
    /// MACD line (fast EMA - slow EMA)
    pub macd: f64,
    /// Signal line (EMA of MACD)
    pub signal: f64,
    /// Histogram (MACD - Signal)
    pub histogram: f64,
}

/// MACD (Moving Average Convergence Divergence).
#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    /// Create a MACD with the standard (12, 26, 9) parameters.
    pub fn new() -> Self {
        Self::with_periods(12, 26, 9)
    }

    /// Create a MACD with custom periods.
    pub fn with_periods(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        assert!(
            fast_period < slow_period,
            "Fast period must be less than slow period"
        );
        Self {
            fast_period,
            slow_period,
            signal_period,
        }
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiOutputIndicator for Macd {
    type Outputs = MacdOutput;

    fn calculate(&self, data: &[f64]) -> Vec<MacdOutput> {
        let fast = Ema::new(self.fast_period).calculate(data);
        let slow = Ema::new(self.slow_period).calculate(data);
        if slow.is_empty() {
            return vec![];
        }

        // Both series are tail-aligned with the input; overlay on the
        // shorter (slow) one.
        let offset = fast.len() - slow.len();
        let macd_line: Vec<f64> = slow
            .iter()
            .enumerate()
            .map(|(i, &s)| fast[i + offset] - s)
            .collect();

        let signal_line = Ema::new(self.signal_period).calculate(&macd_line);
        if signal_line.is_empty() {
            return vec![];
        }

        let offset = macd_line.len() - signal_line.len();
        signal_line
            .iter()
            .enumerate()
            .map(|(i, &signal)| {
                let macd = macd_line[i + offset];
                MacdOutput {
                    macd,
                    signal,
                    histogram: macd - signal,
                }
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.slow_period + self.signal_period
    }

    fn name(&self) -> &str {
        "MACD"
    }
}

/// KDJ output values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KdjOutput {
    /// K (fast stochastic, smoothed)
    pub k: f64,
    /// D (smoothed K)
    pub d: f64,
    /// J (3K - 2D), leads K and D past the 0-100 band when overextended
    pub j: f64,
}

/// KDJ stochastic oscillator.
///
/// A stochastic variant common on crypto venues: RSV smoothed twice with a
/// weighted moving average, plus the J divergence line.
#[derive(Debug, Clone)]
pub struct Kdj {
    period: usize,
    smoothing: usize,
}

impl Kdj {
    /// Create a KDJ with the standard (9, 3) parameters.
    pub fn new(period: usize, smoothing: usize) -> Self {
        assert!(period > 0 && smoothing > 0, "Periods must be greater than 0");
        Self { period, smoothing }
    }

    /// Weighted smoothing: (value + (n-1) * prev) / n.
    #[inline]
    fn smooth(value: f64, n: usize, prev: f64) -> f64 {
        (value + (n as f64 - 1.0) * prev) / n as f64
    }
}

impl OhlcvIndicator for Kdj {
    type Output = KdjOutput;

    fn calculate(&self, high: &[f64], low: &[f64], close: &[f64], _volume: &[f64]) -> Vec<KdjOutput> {
        let len = close.len().min(high.len()).min(low.len());
        if len < self.period {
            return vec![];
        }

        let mut result = Vec::with_capacity(len - self.period + 1);
        let mut k = 50.0;
        let mut d = 50.0;

        for i in (self.period - 1)..len {
            let window = (i + 1 - self.period)..=i;
            let window_high = high[window.clone()].iter().cloned().fold(f64::MIN, f64::max);
            let window_low = low[window].iter().cloned().fold(f64::MAX, f64::min);

            let rsv = if window_high == window_low {
                50.0
            } else {
                (close[i] - window_low) / (window_high - window_low) * 100.0
            };

            k = Self::smooth(rsv, self.smoothing, k);
            d = Self::smooth(k, self.smoothing, d);
            let j = 3.0 * k - 2.0 * d;
            result.push(KdjOutput { k, d, j });
        }

        result
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "KDJ"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_all_gains_is_100() {
        let rsi = Rsi::new(5);
        let data: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let result = rsi.calculate(&data);
        assert!(!result.is_empty());
        assert!(result.iter().all(|&v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_rsi_bounded() {
        let rsi = Rsi::new(14);
        let data: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        for value in rsi.calculate(&data) {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_macd_histogram_sign_follows_trend() {
        let macd = Macd::with_periods(3, 6, 3);
        let mut data: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * 0.1).collect();
        data.extend((0..30).map(|i| 97.0 + i as f64 * 0.8));
        let result = macd.calculate(&data);
        // A strong late uptrend pushes the histogram positive.
        assert!(result.last().unwrap().histogram > 0.0);
    }

    #[test]
    fn test_kdj_flat_market_stays_centered() {
        let kdj = Kdj::new(9, 3);
        let high = vec![101.0; 30];
        let low = vec![99.0; 30];
        let close = vec![100.0; 30];
        let result = kdj.calculate(&high, &low, &close, &[]);
        let last = result.last().unwrap();
        assert!((last.k - 50.0).abs() < 1.0);
        assert!((last.j - 50.0).abs() < 2.0);
    }

    #[test]
    fn test_kdj_overbought_on_sustained_rally() {
        let kdj = Kdj::new(9, 3);
        let close: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let result = kdj.calculate(&high, &low, &close, &[]);
        let last = result.last().unwrap();
        assert!(last.k > 80.0);
        assert!(last.j > 90.0);
    }
}
