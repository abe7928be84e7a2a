//! Synchronized basket reversal detection.
//!
//! A reversal is called when most basket members set their local extreme
//! within a narrow window of each other and have since retraced by a large
//! margin. A top implies the old trend was up; a bottom that it was down.

use perp_core::types::{Candle, PositionSide};

/// Which extreme the basket set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalKind {
    /// Synchronized local high followed by a deep retrace down
    Top,
    /// Synchronized local low followed by a sharp retrace up
    Bottom,
}

/// A detected synchronized reversal.
#[derive(Debug, Clone, Copy)]
pub struct ReversalEvent {
    pub kind: ReversalKind,
    /// Members that retraced together
    pub members: usize,
    /// Mean retrace among those members, percent
    pub avg_retrace_pct: f64,
    /// Detection time, Unix milliseconds
    pub detected_at_ms: i64,
}

impl ReversalEvent {
    /// Side whose open positions the old trend was carrying; these are
    /// flattened immediately.
    pub fn flatten_side(&self) -> PositionSide {
        match self.kind {
            ReversalKind::Top => PositionSide::Long,
            ReversalKind::Bottom => PositionSide::Short,
        }
    }

    /// Side blocked from new entries while the emergency lock holds.
    pub fn blocked_side(&self) -> PositionSide {
        self.flatten_side()
    }
}

#[derive(Debug, Clone, Copy)]
struct MemberExtreme {
    /// Candles between the extreme and the newest candle
    offset_from_end: usize,
    retrace_pct: f64,
}

/// Scan basket members for a synchronized reversal. Each member is its
/// recent confirmed candle window, oldest first.
pub fn scan(
    members: &[Vec<&Candle>],
    min_retrace_pct: f64,
    sync_candles: usize,
    min_members: usize,
    now_ms: i64,
) -> Option<ReversalEvent> {
    for kind in [ReversalKind::Top, ReversalKind::Bottom] {
        let extremes: Vec<MemberExtreme> = members
            .iter()
            .filter_map(|candles| member_extreme(candles, kind))
            .filter(|e| e.retrace_pct >= min_retrace_pct)
            .collect();

        if extremes.len() < min_members {
            continue;
        }
        let min_offset = extremes.iter().map(|e| e.offset_from_end).min()?;
        let max_offset = extremes.iter().map(|e| e.offset_from_end).max()?;
        if max_offset - min_offset > sync_candles {
            continue;
        }

        let avg_retrace_pct =
            extremes.iter().map(|e| e.retrace_pct).sum::<f64>() / extremes.len() as f64;
        return Some(ReversalEvent {
            kind,
            members: extremes.len(),
            avg_retrace_pct,
            detected_at_ms: now_ms,
        });
    }
    None
}

fn member_extreme(candles: &[&Candle], kind: ReversalKind) -> Option<MemberExtreme> {
    if candles.len() < 2 {
        return None;
    }
    let last_close = candles.last()?.close;

    let (index, extreme) = match kind {
        ReversalKind::Top => candles
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.high))
            .fold(None, |best: Option<(usize, f64)>, (i, h)| match best {
                Some((_, bh)) if bh >= h => best,
                _ => Some((i, h)),
            })?,
        ReversalKind::Bottom => candles
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.low))
            .fold(None, |best: Option<(usize, f64)>, (i, l)| match best {
                Some((_, bl)) if bl <= l => best,
                _ => Some((i, l)),
            })?,
    };
    // An extreme on the window's first candle is just the lookback edge,
    // not a local extreme the member actually set.
    if index == 0 || extreme <= 0.0 {
        return None;
    }

    let retrace_pct = match kind {
        ReversalKind::Top => (extreme - last_close) / extreme * 100.0,
        ReversalKind::Bottom => (last_close - extreme) / extreme * 100.0,
    };
    Some(MemberExtreme {
        offset_from_end: candles.len() - 1 - index,
        retrace_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ramp up to a peak at `peak_offset` candles from the end, then slide
    /// down to a retrace of `retrace_pct`.
    fn topped_series(n: usize, peak_offset: usize, retrace_pct: f64) -> Vec<Candle> {
        let peak_index = n - 1 - peak_offset;
        let peak = 110.0;
        let bottom = peak * (1.0 - retrace_pct / 100.0);
        (0..n)
            .map(|i| {
                let price = if i <= peak_index {
                    100.0 + (peak - 100.0) * i as f64 / peak_index as f64
                } else {
                    let t = (i - peak_index) as f64 / (n - 1 - peak_index) as f64;
                    peak - (peak - bottom) * t
                };
                Candle::new(i as i64 * 300_000, price, price + 0.1, price - 0.1, price, 1000.0)
            })
            .collect()
    }

    fn refs(candles: &[Candle]) -> Vec<&Candle> {
        candles.iter().collect()
    }

    #[test]
    fn test_synchronized_top_detected() {
        let a = topped_series(48, 10, 6.0);
        let b = topped_series(48, 11, 7.0);
        let c = topped_series(48, 9, 5.5);
        let d = topped_series(48, 10, 8.0);
        let members = vec![refs(&a), refs(&b), refs(&c), refs(&d)];

        let event = scan(&members, 5.0, 2, 3, 1_000).expect("top expected");
        assert_eq!(event.kind, ReversalKind::Top);
        assert_eq!(event.members, 4);
        assert!(event.avg_retrace_pct >= 5.0);
        assert_eq!(event.flatten_side(), PositionSide::Long);
    }

    #[test]
    fn test_shallow_retrace_is_not_a_reversal() {
        let a = topped_series(48, 10, 2.0);
        let b = topped_series(48, 11, 2.5);
        let c = topped_series(48, 9, 1.5);
        let d = topped_series(48, 10, 2.2);
        let members = vec![refs(&a), refs(&b), refs(&c), refs(&d)];

        assert!(scan(&members, 5.0, 2, 3, 1_000).is_none());
    }

    #[test]
    fn test_desynchronized_extremes_do_not_fire() {
        // Deep retraces but peaks 20 candles apart
        let a = topped_series(48, 5, 6.0);
        let b = topped_series(48, 25, 7.0);
        let c = topped_series(48, 6, 6.5);
        let members = vec![refs(&a), refs(&b), refs(&c)];

        assert!(scan(&members, 5.0, 2, 3, 1_000).is_none());
    }

    #[test]
    fn test_minority_retrace_does_not_fire() {
        let a = topped_series(48, 10, 6.0);
        let b = topped_series(48, 10, 1.0);
        let c = topped_series(48, 10, 0.5);
        let d = topped_series(48, 10, 1.2);
        let members = vec![refs(&a), refs(&b), refs(&c), refs(&d)];

        assert!(scan(&members, 5.0, 2, 3, 1_000).is_none());
    }

    #[test]
    fn test_bottom_reversal_flattens_shorts() {
        // Mirror a top: fall to a low then bounce hard
        let inverted: Vec<Vec<Candle>> = (0..4)
            .map(|_| {
                topped_series(48, 10, 6.0)
                    .into_iter()
                    .map(|c| {
                        // Reflect prices around 100
                        Candle::new(
                            c.open_time,
                            200.0 - c.open,
                            200.0 - c.low,
                            200.0 - c.high,
                            200.0 - c.close,
                            c.volume,
                        )
                    })
                    .collect()
            })
            .collect();
        let members: Vec<Vec<&Candle>> = inverted.iter().map(|m| refs(m)).collect();

        let event = scan(&members, 5.0, 2, 3, 1_000).expect("bottom expected");
        assert_eq!(event.kind, ReversalKind::Bottom);
        assert_eq!(event.flatten_side(), PositionSide::Short);
    }
}
