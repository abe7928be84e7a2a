//! Pre-open gates.
//!
//! Every gate must pass before a signal becomes an order. A blocked signal
//! is dropped for this tick and recorded in the audit log with the gate
//! that stopped it; nothing is queued or retried.

use chrono::{DateTime, Duration, Utc};
use perp_core::types::PositionSide;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Which gate dropped a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum GateBlock {
    /// A position already exists on the opposite side of the symbol
    OppositeSide,
    /// The (symbol, direction) position cap is reached
    SideCap { count: usize, cap: usize },
    /// An open or close on this (symbol, direction) is too recent
    Cooldown { remaining_secs: i64 },
    /// A blacklist rule matches
    Blacklisted { reason: String },
    /// Price already sits in the extreme band of its 24h range
    Chasing { percentile: f64 },
    /// The reference basket opposes the signal above the veto threshold
    RegimeVeto { strength_pct: f64 },
    /// A synchronized basket reversal recently blocked this side
    EmergencyLock,
}

impl std::fmt::Display for GateBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateBlock::OppositeSide => write!(f, "opposite-side position exists"),
            GateBlock::SideCap { count, cap } => {
                write!(f, "side cap reached ({count}/{cap})")
            }
            GateBlock::Cooldown { remaining_secs } => {
                write!(f, "cooldown active, {remaining_secs}s remaining")
            }
            GateBlock::Blacklisted { reason } => write!(f, "{reason}"),
            GateBlock::Chasing { percentile } => {
                write!(f, "price at {:.0}% of 24h range", percentile * 100.0)
            }
            GateBlock::RegimeVeto { strength_pct } => {
                write!(f, "basket opposes at {strength_pct:.2}% strength")
            }
            GateBlock::EmergencyLock => write!(f, "emergency reversal lock engaged"),
        }
    }
}

/// Last open/close time per (symbol, direction). Both actions arm the
/// cooldown so a close is not immediately re-entered.
#[derive(Default)]
pub struct CooldownTracker {
    last_action: RwLock<HashMap<(String, PositionSide), DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, symbol: &str, side: PositionSide, at: DateTime<Utc>) {
        self.last_action
            .write()
            .await
            .insert((symbol.to_string(), side), at);
    }

    /// Remaining cooldown for the pair, if any.
    pub async fn remaining(
        &self,
        symbol: &str,
        side: PositionSide,
        now: DateTime<Utc>,
        window_secs: u64,
    ) -> Option<Duration> {
        let map = self.last_action.read().await;
        let last = map.get(&(symbol.to_string(), side))?;
        let elapsed = now - *last;
        let window = Duration::seconds(window_secs as i64);
        if elapsed < window {
            Some(window - elapsed)
        } else {
            None
        }
    }
}

/// Whether `percentile` sits in the chase band for an entry in `side`.
/// Longs chase at the top of the range, shorts at the bottom.
pub fn is_chasing(percentile: f64, side: PositionSide, range_fraction: f64) -> bool {
    match side {
        PositionSide::Long => percentile >= 1.0 - range_fraction,
        PositionSide::Short => percentile <= range_fraction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cooldown_window() {
        let tracker = CooldownTracker::new();
        let now = Utc::now();
        tracker.record("BTC-USDT-SWAP", PositionSide::Long, now).await;

        let remaining = tracker
            .remaining("BTC-USDT-SWAP", PositionSide::Long, now + Duration::seconds(60), 900)
            .await
            .expect("cooldown should be active");
        assert_eq!(remaining.num_seconds(), 840);

        // The other direction is untouched
        assert!(tracker
            .remaining("BTC-USDT-SWAP", PositionSide::Short, now, 900)
            .await
            .is_none());

        // Past the window
        assert!(tracker
            .remaining("BTC-USDT-SWAP", PositionSide::Long, now + Duration::seconds(901), 900)
            .await
            .is_none());
    }

    #[test]
    fn test_chase_band_is_directional() {
        assert!(is_chasing(0.80, PositionSide::Long, 0.25));
        assert!(!is_chasing(0.70, PositionSide::Long, 0.25));
        assert!(is_chasing(0.20, PositionSide::Short, 0.25));
        assert!(!is_chasing(0.30, PositionSide::Short, 0.25));
        // The middle of the range chases nobody
        assert!(!is_chasing(0.5, PositionSide::Long, 0.25));
        assert!(!is_chasing(0.5, PositionSide::Short, 0.25));
    }
}
