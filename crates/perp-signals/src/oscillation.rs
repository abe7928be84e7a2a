//! Oscillation-reversal (fade) detection.
//!
//! A run of unanimous candles inside a tight band is a stalling move; the
//! fade direction is the opposite of the run, taken only when volume
//! confirms the stall (drying up after a green run, surging after a red
//! run).

use perp_core::types::{Candle, PositionSide};

/// Outcome of the oscillation check.
#[derive(Debug, Clone, Copy)]
pub enum OscillationOutcome {
    /// No qualifying run
    NoPattern,
    /// Run found and volume confirms the fade
    Confirmed(OscillationEvent),
    /// Run found but volume disagrees; reported for observability
    VolumeUnconfirmed { ratio: f64 },
}

/// A confirmed fade setup.
#[derive(Debug, Clone, Copy)]
pub struct OscillationEvent {
    /// Fade direction (opposite of the run)
    pub direction: PositionSide,
    /// Second-half to first-half volume ratio over the run
    pub volume_ratio: f64,
    /// Combined high-low range of the run, percent
    pub range_pct: f64,
}

/// Tight-range unanimous-run check over confirmed candles.
#[derive(Debug, Clone)]
pub struct OscillationCheck {
    run_len: usize,
    band_pct: f64,
}

impl OscillationCheck {
    pub fn new(run_len: usize, band_pct: f64) -> Self {
        Self { run_len, band_pct }
    }

    /// Evaluate the last `run_len` confirmed candles, oldest first.
    pub fn evaluate(&self, confirmed: &[&Candle]) -> OscillationOutcome {
        if confirmed.len() < self.run_len {
            return OscillationOutcome::NoPattern;
        }
        let run = &confirmed[confirmed.len() - self.run_len..];

        let all_bullish = run.iter().all(|c| c.is_bullish());
        let all_bearish = run.iter().all(|c| c.is_bearish());
        if !all_bullish && !all_bearish {
            return OscillationOutcome::NoPattern;
        }

        let high = run.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = run.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        if low <= 0.0 {
            return OscillationOutcome::NoPattern;
        }
        let range_pct = (high - low) / low * 100.0;
        if range_pct > self.band_pct {
            return OscillationOutcome::NoPattern;
        }

        let ratio = volume_ratio(run);
        if all_bullish {
            // Green run on drying volume: buyers exhausted, fade short
            if ratio < 1.0 {
                OscillationOutcome::Confirmed(OscillationEvent {
                    direction: PositionSide::Short,
                    volume_ratio: ratio,
                    range_pct,
                })
            } else {
                OscillationOutcome::VolumeUnconfirmed { ratio }
            }
        } else {
            // Red run on surging volume: capitulation, fade long
            if ratio > 1.0 {
                OscillationOutcome::Confirmed(OscillationEvent {
                    direction: PositionSide::Long,
                    volume_ratio: ratio,
                    range_pct,
                })
            } else {
                OscillationOutcome::VolumeUnconfirmed { ratio }
            }
        }
    }
}

/// Mean volume of the second half of the run over the first half.
fn volume_ratio(run: &[&Candle]) -> f64 {
    let mid = run.len() / 2;
    let first: f64 = run[..mid].iter().map(|c| c.volume).sum::<f64>() / mid as f64;
    let second: f64 =
        run[mid..].iter().map(|c| c.volume).sum::<f64>() / (run.len() - mid) as f64;
    if first <= 0.0 {
        return 1.0;
    }
    second / first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: i64, open: f64, close: f64, volume: f64) -> Candle {
        let high = open.max(close) + 0.02;
        let low = open.min(close) - 0.02;
        Candle::new(i * 900_000, open, high, low, close, volume)
    }

    #[test]
    fn test_green_run_drying_volume_fades_short() {
        let candles = vec![
            candle(0, 100.0, 100.1, 1000.0),
            candle(1, 100.1, 100.2, 800.0),
            candle(2, 100.2, 100.3, 500.0),
            candle(3, 100.3, 100.4, 300.0),
        ];
        let refs: Vec<&Candle> = candles.iter().collect();
        let check = OscillationCheck::new(4, 0.5);
        match check.evaluate(&refs) {
            OscillationOutcome::Confirmed(event) => {
                assert_eq!(event.direction, PositionSide::Short);
                assert!(event.volume_ratio < 1.0);
                assert!(event.range_pct <= 0.5);
            }
            other => panic!("expected confirmed fade, got {:?}", other),
        }
    }

    #[test]
    fn test_red_run_surging_volume_fades_long() {
        let candles = vec![
            candle(0, 100.4, 100.3, 300.0),
            candle(1, 100.3, 100.2, 500.0),
            candle(2, 100.2, 100.1, 900.0),
            candle(3, 100.1, 100.0, 1400.0),
        ];
        let refs: Vec<&Candle> = candles.iter().collect();
        let check = OscillationCheck::new(4, 0.5);
        match check.evaluate(&refs) {
            OscillationOutcome::Confirmed(event) => {
                assert_eq!(event.direction, PositionSide::Long);
                assert!(event.volume_ratio > 1.0);
            }
            other => panic!("expected confirmed fade, got {:?}", other),
        }
    }

    #[test]
    fn test_volume_against_pattern_is_reported() {
        // Green run but volume expanding: buyers still in control
        let candles = vec![
            candle(0, 100.0, 100.1, 300.0),
            candle(1, 100.1, 100.2, 500.0),
            candle(2, 100.2, 100.3, 900.0),
            candle(3, 100.3, 100.4, 1400.0),
        ];
        let refs: Vec<&Candle> = candles.iter().collect();
        let check = OscillationCheck::new(4, 0.5);
        assert!(matches!(
            check.evaluate(&refs),
            OscillationOutcome::VolumeUnconfirmed { ratio } if ratio > 1.0
        ));
    }

    #[test]
    fn test_mixed_run_is_no_pattern() {
        let candles = vec![
            candle(0, 100.0, 100.1, 1000.0),
            candle(1, 100.1, 100.0, 800.0),
            candle(2, 100.0, 100.1, 500.0),
            candle(3, 100.1, 100.2, 300.0),
        ];
        let refs: Vec<&Candle> = candles.iter().collect();
        let check = OscillationCheck::new(4, 0.5);
        assert!(matches!(
            check.evaluate(&refs),
            OscillationOutcome::NoPattern
        ));
    }

    #[test]
    fn test_wide_range_is_no_pattern() {
        // Unanimous but 3% of travel, not a stall
        let candles = vec![
            candle(0, 100.0, 100.8, 1000.0),
            candle(1, 100.8, 101.6, 800.0),
            candle(2, 101.6, 102.4, 500.0),
            candle(3, 102.4, 103.0, 300.0),
        ];
        let refs: Vec<&Candle> = candles.iter().collect();
        let check = OscillationCheck::new(4, 0.5);
        assert!(matches!(
            check.evaluate(&refs),
            OscillationOutcome::NoPattern
        ));
    }
}
