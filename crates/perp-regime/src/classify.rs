//! Per-member trend classification.
//!
//! Each basket member is classified from candle-body direction weighted by
//! volume: net power is the count of above-average-volume up candles minus
//! above-average-volume down candles over the lookback window.

use perp_core::traits::MultiOutputIndicator;
use perp_core::types::Candle;
use perp_indicators::EmaSpread;

/// Directional bias of one basket member or of the whole basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeBias {
    Bullish,
    Bearish,
    Neutral,
}

/// One member's classification across its timeframes.
#[derive(Debug, Clone, Copy)]
pub struct MemberTrend {
    /// Summed net power across timeframes
    pub net_power: i32,
    /// Mean EMA-spread strength across timeframes, percent
    pub strength_pct: f64,
}

impl MemberTrend {
    pub fn bias(&self) -> RegimeBias {
        match self.net_power.signum() {
            1 => RegimeBias::Bullish,
            -1 => RegimeBias::Bearish,
            _ => RegimeBias::Neutral,
        }
    }
}

/// Net power of one candle window: high-volume up candles minus
/// high-volume down candles. "High volume" means above the window average.
pub fn net_power(candles: &[&Candle]) -> i32 {
    if candles.is_empty() {
        return 0;
    }
    let avg_volume = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
    let mut power = 0;
    for candle in candles {
        if candle.volume <= avg_volume {
            continue;
        }
        if candle.is_bullish() {
            power += 1;
        } else if candle.is_bearish() {
            power -= 1;
        }
    }
    power
}

/// Trend-strength proxy for one window: absolute fast/slow EMA spread on
/// the newest candle, percent.
pub fn window_strength(closes: &[f64], fast_period: usize, slow_period: usize) -> f64 {
    EmaSpread::new(fast_period, slow_period)
        .calculate(closes)
        .last()
        .map(|p| p.strength_pct())
        .unwrap_or(0.0)
}
