//! Exit state machine.
//!
//! Evaluated every monitoring tick for each open position. Checks run in a
//! fixed priority order and the first match wins. Whether or not an exit
//! fires, the tick records the running high-water mark and ratchets the
//! trailing price so a later activation works from fresh data.

use chrono::{DateTime, Utc};
use perp_config::ExitSettings;
use perp_core::traits::MultiOutputIndicator;
use perp_core::types::{ExitReason, Position, PositionSide};
use perp_indicators::EmaSpread;
use perp_signals::CrossoverCheck;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// What the state machine decided for this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    /// Nothing fired; the position stays open
    Hold,
    /// Close the full remaining quantity
    Close { reason: ExitReason },
    /// Take partial profit at the first trailing activation
    PartialTake { fraction: Decimal },
}

/// Market inputs for one exit evaluation. Close series may be empty when a
/// candle fetch failed; candle-based checks then skip for the tick.
pub struct ExitContext<'a> {
    /// Current mark price
    pub price: Decimal,
    /// Evaluation time
    pub now: DateTime<Utc>,
    /// Confirmed closes on the fast timeframe (counter-signal stop)
    pub fast_closes: &'a [f64],
    /// Confirmed closes on the entry timeframe (reversal, trend strength)
    pub mid_closes: &'a [f64],
}

/// Priority-ordered exit evaluator.
pub struct ExitEvaluator {
    settings: ExitSettings,
    counter: CrossoverCheck,
    reversal: CrossoverCheck,
    spread: EmaSpread,
}

impl ExitEvaluator {
    /// Create an evaluator sharing the detector's EMA pair.
    pub fn new(settings: ExitSettings, fast_period: usize, slow_period: usize) -> Self {
        let counter = CrossoverCheck::new(
            fast_period,
            slow_period,
            settings.counter_signal_min_strength_pct,
        );
        // An established position exits on any confirmed reversal; no
        // strength filter here
        let reversal = CrossoverCheck::new(fast_period, slow_period, 0.0);
        Self {
            settings,
            counter,
            reversal,
            spread: EmaSpread::new(fast_period, slow_period),
        }
    }

    pub fn settings(&self) -> &ExitSettings {
        &self.settings
    }

    /// Run one tick of the state machine. Mutates the position's high-water
    /// and trailing bookkeeping regardless of the decision; the caller
    /// persists the row as a single write.
    pub fn evaluate(&self, position: &mut Position, ctx: &ExitContext<'_>) -> ExitDecision {
        let pnl_pct = position.unrealized_pnl_pct(ctx.price);

        let new_high = position.record_high_water(pnl_pct);
        let mut just_activated = false;
        if !position.trailing.activated && pnl_pct >= self.settings.trailing_activation_pct {
            position.activate_trailing(self.trail_candidate(position.side, ctx.price));
            just_activated = true;
        } else if position.trailing.activated && new_high {
            position.ratchet_trailing(self.trail_candidate(position.side, ctx.price));
        }

        // 1. Hard stop
        if price_through(position.side, ctx.price, position.stop_loss_price, true) {
            return ExitDecision::Close {
                reason: ExitReason::HardStop,
            };
        }

        // 2. Counter-signal stop, only while losing
        if pnl_pct < Decimal::ZERO && self.counter_flip(position.side, ctx.fast_closes) {
            return ExitDecision::Close {
                reason: ExitReason::CounterSignal,
            };
        }

        // 3. Max take-profit
        if price_through(position.side, ctx.price, position.take_profit_price, false) {
            return ExitDecision::Close {
                reason: ExitReason::MaxTakeProfit,
            };
        }

        // 4. Crossover reversal on the entry timeframe
        if self.reversal.reversal_against(ctx.mid_closes, position.side) {
            return ExitDecision::Close {
                reason: ExitReason::CrossoverReversal,
            };
        }

        // 5. Trend weakening, after a minimum dwell and only in profit
        if self.trend_weakened(position, pnl_pct, ctx) {
            return ExitDecision::Close {
                reason: ExitReason::TrendWeakening,
            };
        }

        // 6. Trailing stop
        if position.trailing_breached(ctx.price) {
            return ExitDecision::Close {
                reason: ExitReason::TrailingStop,
            };
        }
        if just_activated {
            if let Some(fraction) = self.settings.partial_take_fraction {
                return ExitDecision::PartialTake { fraction };
            }
        }

        ExitDecision::Hold
    }

    fn trail_candidate(&self, side: PositionSide, price: Decimal) -> Decimal {
        let distance = self.settings.trailing_distance_pct / dec!(100);
        match side {
            PositionSide::Long => price * (Decimal::ONE - distance),
            PositionSide::Short => price * (Decimal::ONE + distance),
        }
    }

    fn counter_flip(&self, side: PositionSide, fast_closes: &[f64]) -> bool {
        match self.counter.evaluate(fast_closes) {
            Some(event) => event.direction == side.opposite(),
            None => false,
        }
    }

    fn trend_weakened(
        &self,
        position: &Position,
        pnl_pct: Decimal,
        ctx: &ExitContext<'_>,
    ) -> bool {
        let dwell = (ctx.now - position.opened_at).num_seconds();
        if dwell < self.settings.trend_weaken_min_dwell_secs as i64 {
            return false;
        }
        if pnl_pct < self.settings.trend_weaken_min_profit_pct {
            return false;
        }
        let Some(strength) = self
            .spread
            .calculate(ctx.mid_closes)
            .last()
            .map(|p| p.strength_pct())
        else {
            return false;
        };
        strength < position.entry_snapshot.ema_spread_pct / 2.0
    }
}

/// Whether `price` has crossed the level against (stop) or in favor of
/// (take-profit) the position.
fn price_through(side: PositionSide, price: Decimal, level: Decimal, adverse: bool) -> bool {
    match (side, adverse) {
        (PositionSide::Long, true) | (PositionSide::Short, false) => price <= level,
        (PositionSide::Long, false) | (PositionSide::Short, true) => price >= level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use perp_core::types::{IndicatorSnapshot, PositionStatus, SignalKind};

    fn snapshot(spread_pct: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_spread_pct: spread_pct,
            rsi: None,
            macd_histogram: None,
            kdj_j: None,
            ma_distance_pct: 0.0,
        }
    }

    /// Open long at 50000, leverage 1, 2.5% stop, 10% take-profit.
    fn open_long(entry_spread_pct: f64) -> Position {
        let mut position = Position::new(
            "BTC-USDT-SWAP",
            PositionSide::Long,
            dec!(1),
            dec!(50000),
            1,
            dec!(50000),
            dec!(48750),
            dec!(55000),
            SignalKind::Crossover,
            snapshot(entry_spread_pct),
            Utc::now() + Duration::hours(24),
        );
        position.transition(PositionStatus::Building).unwrap();
        position.transition(PositionStatus::Open).unwrap();
        position
    }

    fn settings() -> ExitSettings {
        ExitSettings {
            stop_loss_pct: dec!(2.5),
            ..ExitSettings::default()
        }
    }

    fn ctx(price: Decimal, now: DateTime<Utc>) -> ExitContext<'static> {
        ExitContext {
            price,
            now,
            fast_closes: &[],
            mid_closes: &[],
        }
    }

    #[test]
    fn test_hard_stop_fires_on_breach() {
        let evaluator = ExitEvaluator::new(settings(), 9, 26);
        let mut position = open_long(1.0);
        // -3% at 1x leverage
        let decision = evaluator.evaluate(&mut position, &ctx(dec!(48500), Utc::now()));
        assert_eq!(
            decision,
            ExitDecision::Close {
                reason: ExitReason::HardStop
            }
        );
    }

    #[test]
    fn test_hard_stop_outranks_trend_weakening() {
        // Force the trend-weakening condition to also hold: no dwell, no
        // profit floor, flat closes with near-zero spread strength against
        // a 1% entry spread
        let weak = ExitSettings {
            stop_loss_pct: dec!(2.5),
            trend_weaken_min_dwell_secs: 0,
            trend_weaken_min_profit_pct: dec!(-100),
            ..ExitSettings::default()
        };
        let evaluator = ExitEvaluator::new(weak, 9, 26);
        let mut position = open_long(1.0);
        position.opened_at = Utc::now() - Duration::hours(2);

        let flat: Vec<f64> = vec![48500.0; 40];
        let context = ExitContext {
            price: dec!(48500),
            now: Utc::now(),
            fast_closes: &[],
            mid_closes: &flat,
        };
        // Both conditions true; hard stop wins on priority
        assert!(evaluator.trend_weakened(&position, dec!(-3), &context));
        let decision = evaluator.evaluate(&mut position, &context);
        assert_eq!(
            decision,
            ExitDecision::Close {
                reason: ExitReason::HardStop
            }
        );
    }

    #[test]
    fn test_max_take_profit() {
        let evaluator = ExitEvaluator::new(settings(), 9, 26);
        let mut position = open_long(1.0);
        let decision = evaluator.evaluate(&mut position, &ctx(dec!(55000), Utc::now()));
        assert_eq!(
            decision,
            ExitDecision::Close {
                reason: ExitReason::MaxTakeProfit
            }
        );
    }

    #[test]
    fn test_trailing_activation_ratchet_and_breach() {
        // 1.5% activation, 0.5% distance at 1x leverage
        let evaluator = ExitEvaluator::new(settings(), 9, 26);
        let mut position = open_long(1.0);
        let now = Utc::now();

        // +0.5%: nothing
        assert_eq!(
            evaluator.evaluate(&mut position, &ctx(dec!(50250), now)),
            ExitDecision::Hold
        );
        assert!(!position.trailing.activated);

        // +1.5%: activates, trail at 0.5% under the mark, no exit
        assert_eq!(
            evaluator.evaluate(&mut position, &ctx(dec!(50750), now)),
            ExitDecision::Hold
        );
        assert!(position.trailing.activated);
        assert_eq!(position.trailing.trail_price, Some(dec!(50496.25)));

        // +2%: ratchets
        assert_eq!(
            evaluator.evaluate(&mut position, &ctx(dec!(51000), now)),
            ExitDecision::Hold
        );
        assert_eq!(position.trailing.trail_price, Some(dec!(50745.00)));

        // back to +1%: through the trail, closes at the current mark
        assert_eq!(
            evaluator.evaluate(&mut position, &ctx(dec!(50500), now)),
            ExitDecision::Close {
                reason: ExitReason::TrailingStop
            }
        );
    }

    #[test]
    fn test_trailing_never_retreats_on_pullback() {
        let evaluator = ExitEvaluator::new(settings(), 9, 26);
        let mut position = open_long(1.0);
        let now = Utc::now();

        evaluator.evaluate(&mut position, &ctx(dec!(51000), now));
        let trail = position.trailing.trail_price.unwrap();

        // Pullback above the trail: no ratchet down, no exit
        assert_eq!(
            evaluator.evaluate(&mut position, &ctx(dec!(50900), now)),
            ExitDecision::Hold
        );
        assert_eq!(position.trailing.trail_price, Some(trail));
    }

    #[test]
    fn test_counter_signal_only_while_losing() {
        let evaluator = ExitEvaluator::new(settings(), 9, 26);

        // Downtrend turning up: a bullish flip that counters a short
        let mut closes: Vec<f64> = (0..40).map(|i| 110.0 - i as f64 * 0.25).collect();
        for i in 0..8 {
            closes.push(100.0 + i as f64 * 1.5);
        }
        let spread = EmaSpread::new(9, 26);
        let points = spread.calculate(&closes);
        let offset = closes.len() - points.len();
        let mut fast_closes = closes.clone();
        for i in 1..points.len() {
            if points[i - 1].fast_above() != points[i].fast_above() {
                fast_closes = closes[..offset + i + 1].to_vec();
                break;
            }
        }

        let mut short = open_long(1.0);
        short.side = PositionSide::Short;
        short.stop_loss_price = dec!(51250);
        short.take_profit_price = dec!(45000);

        // Losing short (price above entry) plus a counter flip: exit
        let losing = ExitContext {
            price: dec!(50500),
            now: Utc::now(),
            fast_closes: &fast_closes,
            mid_closes: &[],
        };
        assert_eq!(
            evaluator.evaluate(&mut short, &losing),
            ExitDecision::Close {
                reason: ExitReason::CounterSignal
            }
        );

        // Same flip while winning: the counter-signal stop stays quiet
        let mut winning_short = open_long(1.0);
        winning_short.side = PositionSide::Short;
        winning_short.stop_loss_price = dec!(51250);
        winning_short.take_profit_price = dec!(45000);
        let winning = ExitContext {
            price: dec!(49500),
            now: Utc::now(),
            fast_closes: &fast_closes,
            mid_closes: &[],
        };
        assert_eq!(evaluator.evaluate(&mut winning_short, &winning), ExitDecision::Hold);
    }

    #[test]
    fn test_trend_weakening_needs_dwell_and_profit() {
        let exit_settings = ExitSettings {
            stop_loss_pct: dec!(2.5),
            trend_weaken_min_dwell_secs: 1800,
            trend_weaken_min_profit_pct: dec!(1.0),
            ..ExitSettings::default()
        };
        let evaluator = ExitEvaluator::new(exit_settings, 9, 26);
        let flat: Vec<f64> = vec![50600.0; 40];
        let now = Utc::now();

        // Fresh position: dwell not reached
        let mut fresh = open_long(1.0);
        let context = ExitContext {
            price: dec!(50600),
            now,
            fast_closes: &[],
            mid_closes: &flat,
        };
        assert_eq!(evaluator.evaluate(&mut fresh, &context), ExitDecision::Hold);

        // Dwelled and in profit with decayed strength: exits
        let mut dwelled = open_long(1.0);
        dwelled.opened_at = now - Duration::hours(1);
        assert_eq!(
            evaluator.evaluate(&mut dwelled, &context),
            ExitDecision::Close {
                reason: ExitReason::TrendWeakening
            }
        );
    }

    #[test]
    fn test_partial_take_on_first_activation() {
        let exit_settings = ExitSettings {
            stop_loss_pct: dec!(2.5),
            partial_take_fraction: Some(dec!(0.5)),
            ..ExitSettings::default()
        };
        let evaluator = ExitEvaluator::new(exit_settings, 9, 26);
        let mut position = open_long(1.0);
        let now = Utc::now();

        let decision = evaluator.evaluate(&mut position, &ctx(dec!(50750), now));
        assert_eq!(
            decision,
            ExitDecision::PartialTake {
                fraction: dec!(0.5)
            }
        );

        // Activation happens once; the next tick holds
        assert_eq!(
            evaluator.evaluate(&mut position, &ctx(dec!(50750), now)),
            ExitDecision::Hold
        );
    }
}
