//! Signal types. Signals are ephemeral: they live for one evaluation tick
//! and drive a single open decision.

use serde::{Deserialize, Serialize};

use super::PositionSide;

/// The detector that produced a signal. Detectors fire in this priority
/// order; the kind is machine-checkable while `reason` keeps the
/// human-readable detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Fast/slow moving-average flip on the confirmed candle
    Crossover,
    /// Slow-timeframe trend with expanding fast-timeframe EMA spread
    SustainedTrend,
    /// Unanimous tight-range run with volume confirmation, faded
    OscillationReversal,
    /// Crossover variant used only to place a resting limit order
    LimitEntry,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Crossover => write!(f, "crossover"),
            SignalKind::SustainedTrend => write!(f, "sustained_trend"),
            SignalKind::OscillationReversal => write!(f, "oscillation_reversal"),
            SignalKind::LimitEntry => write!(f, "limit_entry"),
        }
    }
}

/// Indicator values captured when a signal fires. Stored on the position at
/// entry so exit rules can compare against entry-time conditions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// |fast EMA - slow EMA| / slow EMA, percent
    pub ema_spread_pct: f64,
    /// RSI at entry
    pub rsi: Option<f64>,
    /// MACD histogram at entry
    pub macd_histogram: Option<f64>,
    /// KDJ J value at entry
    pub kdj_j: Option<f64>,
    /// Price distance from the short EMA, percent
    pub ma_distance_pct: f64,
}

/// A directional trading signal for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Symbol the signal applies to
    pub symbol: String,
    /// Direction to enter
    pub direction: PositionSide,
    /// Which detector fired
    pub kind: SignalKind,
    /// Trend-strength proxy, percent (EMA/MA spread on the confirmed candle)
    pub strength_pct: f64,
    /// Reference price when the signal fired
    pub price: f64,
    /// Entry price for limit-entry signals
    pub limit_price: Option<f64>,
    /// Human-readable explanation
    pub reason: String,
    /// Indicator values at detection time
    pub snapshot: IndicatorSnapshot,
    /// Detection time, Unix milliseconds
    pub timestamp: i64,
}

/// Why an admission filter rejected a candidate signal. Reported for
/// observability; a rejection is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "filter")]
pub enum FilterReject {
    /// RSI above the long entry bound
    RsiOverbought { rsi: f64, bound: f64 },
    /// RSI below the short entry bound
    RsiOversold { rsi: f64, bound: f64 },
    /// MACD histogram sign disagrees with the signal direction
    MacdDisagrees { histogram: f64 },
    /// KDJ J value in the overbought/oversold zone
    KdjOverextended { j: f64, bound: f64 },
    /// Candle has already moved too far from its short EMA
    TooFarFromMean { distance_pct: f64, cap_pct: f64 },
    /// Volume does not confirm the reversal pattern
    VolumeUnconfirmed { ratio: f64 },
}

impl std::fmt::Display for FilterReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReject::RsiOverbought { rsi, bound } => {
                write!(f, "RSI {:.1} above long bound {:.1}", rsi, bound)
            }
            FilterReject::RsiOversold { rsi, bound } => {
                write!(f, "RSI {:.1} below short bound {:.1}", rsi, bound)
            }
            FilterReject::MacdDisagrees { histogram } => {
                write!(f, "MACD histogram {:.4} against signal direction", histogram)
            }
            FilterReject::KdjOverextended { j, bound } => {
                write!(f, "KDJ J {:.1} past bound {:.1}", j, bound)
            }
            FilterReject::TooFarFromMean { distance_pct, cap_pct } => {
                write!(
                    f,
                    "price {:.2}% from short EMA exceeds {:.2}% chase cap",
                    distance_pct, cap_pct
                )
            }
            FilterReject::VolumeUnconfirmed { ratio } => {
                write!(f, "volume ratio {:.2} does not confirm reversal", ratio)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(SignalKind::Crossover.to_string(), "crossover");
        assert_eq!(SignalKind::LimitEntry.to_string(), "limit_entry");
    }

    #[test]
    fn test_filter_reject_serializes_tagged() {
        let reject = FilterReject::TooFarFromMean {
            distance_pct: 3.2,
            cap_pct: 2.0,
        };
        let json = serde_json::to_string(&reject).unwrap();
        assert!(json.contains("\"filter\":\"too_far_from_mean\""));
    }
}
