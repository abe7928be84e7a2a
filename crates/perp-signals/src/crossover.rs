//! Confirmed-candle EMA crossover detection.
//!
//! A crossover fires when the fast/slow EMA pair flips order between the
//! last two confirmed candles. Evaluating confirmed closes only keeps the
//! check stable within a candle: the forming candle can flip the pair back
//! and forth many times before it closes.

use perp_core::traits::MultiOutputIndicator;
use perp_core::types::PositionSide;
use perp_indicators::{EmaSpread, SpreadPoint};

/// A confirmed crossover event.
#[derive(Debug, Clone, Copy)]
pub struct CrossoverEvent {
    /// Direction implied by the flip
    pub direction: PositionSide,
    /// |fast - slow| / slow on the confirmed candle, percent
    pub strength_pct: f64,
    /// Fast EMA on the confirmed candle
    pub fast: f64,
    /// Slow EMA on the confirmed candle
    pub slow: f64,
}

/// Fast/slow EMA crossover check over confirmed closes.
#[derive(Debug, Clone)]
pub struct CrossoverCheck {
    spread: EmaSpread,
    min_strength_pct: f64,
}

impl CrossoverCheck {
    /// Create a check for the given EMA pair and minimum flip strength.
    pub fn new(fast_period: usize, slow_period: usize, min_strength_pct: f64) -> Self {
        Self {
            spread: EmaSpread::new(fast_period, slow_period),
            min_strength_pct,
        }
    }

    /// Detect a flip between the last two confirmed candles. Pure over its
    /// input, so the same close history always yields the same answer.
    pub fn evaluate(&self, confirmed_closes: &[f64]) -> Option<CrossoverEvent> {
        let points = self.spread.calculate(confirmed_closes);
        if points.len() < 2 {
            return None;
        }
        self.flip(&points[points.len() - 2], &points[points.len() - 1])
    }

    fn flip(&self, prev: &SpreadPoint, last: &SpreadPoint) -> Option<CrossoverEvent> {
        if prev.fast_above() == last.fast_above() {
            return None;
        }
        let strength_pct = last.strength_pct();
        if strength_pct < self.min_strength_pct {
            return None;
        }
        let direction = if last.fast_above() {
            PositionSide::Long
        } else {
            PositionSide::Short
        };
        Some(CrossoverEvent {
            direction,
            strength_pct,
            fast: last.fast,
            slow: last.slow,
        })
    }

    /// Whether a confirmed flip against `side` occurred. Used by the exit
    /// path, which takes any confirmed reversal regardless of strength.
    pub fn reversal_against(&self, confirmed_closes: &[f64], side: PositionSide) -> bool {
        let unfiltered = Self {
            spread: self.spread.clone(),
            min_strength_pct: 0.0,
        };
        match unfiltered.evaluate(confirmed_closes) {
            Some(event) => event.direction == side.opposite(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Downtrend that turns hard; the fast EMA crosses above the slow one
    /// near the end of the series.
    fn reversal_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 110.0 - i as f64 * 0.25).collect();
        for i in 0..8 {
            closes.push(100.0 + i as f64 * 1.5);
        }
        closes
    }

    /// Truncate so the flip sits exactly on the newest confirmed candle.
    fn truncate_at_flip(closes: &[f64]) -> Vec<f64> {
        let spread = EmaSpread::new(9, 26);
        let points = spread.calculate(closes);
        let offset = closes.len() - points.len();
        for i in 1..points.len() {
            if points[i - 1].fast_above() != points[i].fast_above() {
                return closes[..offset + i + 1].to_vec();
            }
        }
        panic!("no flip in test data");
    }

    #[test]
    fn test_flip_detected_on_confirmed_candle() {
        let closes = truncate_at_flip(&reversal_closes());
        let check = CrossoverCheck::new(9, 26, 0.0);
        let event = check.evaluate(&closes).expect("flip expected");
        assert_eq!(event.direction, PositionSide::Long);
        assert!(event.strength_pct > 0.0);
        assert!(event.fast > event.slow);
    }

    #[test]
    fn test_detection_is_idempotent() {
        let closes = truncate_at_flip(&reversal_closes());
        let check = CrossoverCheck::new(9, 26, 0.0);
        let first = check.evaluate(&closes).unwrap();
        let second = check.evaluate(&closes).unwrap();
        assert_eq!(first.direction, second.direction);
        assert!((first.strength_pct - second.strength_pct).abs() < 1e-12);
    }

    #[test]
    fn test_min_strength_suppresses_weak_flip() {
        let closes = truncate_at_flip(&reversal_closes());
        let check = CrossoverCheck::new(9, 26, 0.0);
        let strength = check.evaluate(&closes).unwrap().strength_pct;

        // Same history with a threshold just above the flip's strength
        let strict = CrossoverCheck::new(9, 26, strength + 0.01);
        assert!(strict.evaluate(&closes).is_none());
    }

    #[test]
    fn test_no_flip_no_event() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let check = CrossoverCheck::new(9, 26, 0.0);
        assert!(check.evaluate(&closes).is_none());
    }

    #[test]
    fn test_old_flip_is_stale() {
        // Extend past the flip; the pair settled into the new order several
        // candles ago, so no fresh event fires.
        let closes = reversal_closes();
        let check = CrossoverCheck::new(9, 26, 0.0);
        assert!(check.evaluate(&closes).is_none());
    }

    #[test]
    fn test_reversal_against_side() {
        let closes = truncate_at_flip(&reversal_closes());
        let check = CrossoverCheck::new(9, 26, 0.15);
        // Bullish flip reverses a short, not a long
        assert!(check.reversal_against(&closes, PositionSide::Short));
        assert!(!check.reversal_against(&closes, PositionSide::Long));
    }

    #[test]
    fn test_insufficient_history() {
        let check = CrossoverCheck::new(9, 26, 0.0);
        assert!(check.evaluate(&[100.0; 10]).is_none());
    }
}
