//! Position lifecycle types.
//!
//! A position row is the authoritative record of one leveraged position:
//! quantity, side, risk prices, trailing state, and lifecycle status. All
//! mutations that matter for risk (stop prices, trailing ratchet, status)
//! go through methods here so the monotonicity invariants hold everywhere.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

use super::{IndicatorSnapshot, SignalKind};

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Get the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// Sign for PnL calculations (+1 long, -1 short).
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => -Decimal::ONE,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Position lifecycle status. Moves strictly forward:
/// `Pending -> Building -> Open -> Closed`, with `Cancelled` reachable only
/// before the position is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Row created, entry order not yet acknowledged
    Pending,
    /// Entry order acknowledged, fill in progress
    Building,
    /// Fully entered and monitored
    Open,
    /// Terminal: closed with realized PnL
    Closed,
    /// Terminal: entry abandoned before any fill
    Cancelled,
}

impl PositionStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Cancelled)
    }

    /// Whether a transition to `to` is legal. No skipping, no reversal.
    pub fn can_transition(&self, to: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, to),
            (Pending, Building) | (Pending, Cancelled) | (Building, Open) | (Building, Cancelled) | (Open, Closed)
        )
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PositionStatus::Pending => "pending",
            PositionStatus::Building => "building",
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
            PositionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Why a position was closed. First matching rule in the exit state
/// machine wins; the variant order here mirrors that priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Unrealized loss hit the configured stop percentage
    HardStop,
    /// Fast-timeframe indicator flipped against a losing position
    CounterSignal,
    /// Unrealized profit hit the configured cap
    MaxTakeProfit,
    /// Confirmed-candle crossover against the position side
    CrossoverReversal,
    /// EMA-spread strength decayed below half its entry value
    TrendWeakening,
    /// Price crossed back through the trailing price
    TrailingStop,
    /// Synchronized reversal across the reference basket
    EmergencyFlatten,
    /// Operator-initiated close
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::HardStop => "hard_stop",
            ExitReason::CounterSignal => "counter_signal",
            ExitReason::MaxTakeProfit => "max_take_profit",
            ExitReason::CrossoverReversal => "crossover_reversal",
            ExitReason::TrendWeakening => "trend_weakening",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::EmergencyFlatten => "emergency_flatten",
            ExitReason::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// Trailing stop/profit state. Inactive until unrealized PnL first reaches
/// the activation threshold; once active, `trail_price` only ratchets in
/// the position's favor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrailingState {
    /// Whether the activation threshold has been reached
    pub activated: bool,
    /// Current trailing price, present once activated
    pub trail_price: Option<Decimal>,
}

/// A leveraged perpetual position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Position ID
    pub id: Uuid,
    /// Symbol
    pub symbol: String,
    /// Long or short
    pub side: PositionSide,
    /// Base quantity; strictly positive while building/open, zero when closed
    pub quantity: Decimal,
    /// Average entry price
    pub entry_price: Decimal,
    /// Leverage multiplier
    pub leverage: u32,
    /// Margin committed at open
    pub margin: Decimal,
    /// Hard stop price
    pub stop_loss_price: Decimal,
    /// Take-profit price
    pub take_profit_price: Decimal,
    /// Trailing stop/profit state
    pub trailing: TrailingState,
    /// Highest unrealized PnL percent seen while open
    pub high_water_pnl_pct: Decimal,
    /// Indicator values captured at entry
    pub entry_snapshot: IndicatorSnapshot,
    /// Detector that opened the position
    pub signal_kind: SignalKind,
    /// Lifecycle status
    pub status: PositionStatus,
    /// Paper/live counterpart position, linked at most once
    counterpart_id: Option<Uuid>,
    /// When the entry was recorded
    pub opened_at: DateTime<Utc>,
    /// Planned-close deadline; exceeding it is a health-check trigger
    pub planned_close_at: DateTime<Utc>,
    /// Close time, terminal only
    pub closed_at: Option<DateTime<Utc>>,
    /// Close fill price, terminal only
    pub close_price: Option<Decimal>,
    /// Realized PnL, terminal only
    pub realized_pnl: Option<Decimal>,
    /// Why the position was closed, terminal only
    pub close_reason: Option<ExitReason>,
}

impl Position {
    /// Create a new pending position.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: u32,
        margin: Decimal,
        stop_loss_price: Decimal,
        take_profit_price: Decimal,
        signal_kind: SignalKind,
        entry_snapshot: IndicatorSnapshot,
        planned_close_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            leverage,
            margin,
            stop_loss_price,
            take_profit_price,
            trailing: TrailingState::default(),
            high_water_pnl_pct: Decimal::MIN,
            entry_snapshot,
            signal_kind,
            status: PositionStatus::Pending,
            counterpart_id: None,
            opened_at: Utc::now(),
            planned_close_at,
            closed_at: None,
            close_price: None,
            realized_pnl: None,
            close_reason: None,
        }
    }

    /// Unrealized PnL as a percent of margin at the given mark price.
    /// Price move percent scaled by leverage, signed by side.
    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let move_pct = (price - self.entry_price) / self.entry_price * dec!(100);
        move_pct * self.side.sign() * Decimal::from(self.leverage)
    }

    /// Unrealized PnL in quote units at the given mark price.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }

    /// Advance the lifecycle status, rejecting skips and reversals.
    pub fn transition(&mut self, to: PositionStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition(to) {
            return Err(LedgerError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Link the paper/live counterpart. The link is write-once.
    pub fn link_counterpart(&mut self, id: Uuid) -> Result<(), LedgerError> {
        if self.counterpart_id.is_some() {
            return Err(LedgerError::CounterpartAlreadyLinked(self.id));
        }
        self.counterpart_id = Some(id);
        Ok(())
    }

    /// The linked counterpart position, if any.
    pub fn counterpart(&self) -> Option<Uuid> {
        self.counterpart_id
    }

    /// Record the running high-water PnL mark. Returns true on a new high.
    pub fn record_high_water(&mut self, pnl_pct: Decimal) -> bool {
        if pnl_pct > self.high_water_pnl_pct {
            self.high_water_pnl_pct = pnl_pct;
            true
        } else {
            false
        }
    }

    /// Tighten the stop-loss. The stop only moves in the position's favor;
    /// a loosening candidate is ignored and `false` returned. Wholesale
    /// replacement is an explicit risk-parameter change, not this path.
    pub fn tighten_stop_loss(&mut self, candidate: Decimal) -> bool {
        let improves = match self.side {
            PositionSide::Long => candidate > self.stop_loss_price,
            PositionSide::Short => candidate < self.stop_loss_price,
        };
        if improves {
            self.stop_loss_price = candidate;
        }
        improves
    }

    /// Activate the trailing stop at the given price.
    pub fn activate_trailing(&mut self, trail_price: Decimal) {
        self.trailing.activated = true;
        self.trailing.trail_price = Some(trail_price);
    }

    /// Ratchet the trailing price. Moves only in the position's favor;
    /// never retreats. Returns true if the price moved.
    pub fn ratchet_trailing(&mut self, candidate: Decimal) -> bool {
        let Some(current) = self.trailing.trail_price else {
            return false;
        };
        let improves = match self.side {
            PositionSide::Long => candidate > current,
            PositionSide::Short => candidate < current,
        };
        if improves {
            self.trailing.trail_price = Some(candidate);
        }
        improves
    }

    /// Whether the mark price has crossed back through the trailing price.
    pub fn trailing_breached(&self, price: Decimal) -> bool {
        match (self.trailing.activated, self.trailing.trail_price) {
            (true, Some(trail)) => match self.side {
                PositionSide::Long => price <= trail,
                PositionSide::Short => price >= trail,
            },
            _ => false,
        }
    }

    /// Close the position, recording the terminal fields atomically with
    /// the status transition.
    pub fn close(
        &mut self,
        close_price: Decimal,
        realized_pnl: Decimal,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.transition(PositionStatus::Closed)?;
        self.quantity = Decimal::ZERO;
        self.close_price = Some(close_price);
        self.realized_pnl = Some(realized_pnl);
        self.close_reason = Some(reason);
        self.closed_at = Some(at);
        Ok(())
    }

    /// Whether the planned-close deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now >= self.planned_close_at
    }

    /// Notional exposure at entry.
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndicatorSnapshot;
    use chrono::Duration;

    fn long_position() -> Position {
        Position::new(
            "BTC-USDT-SWAP",
            PositionSide::Long,
            dec!(0.1),
            dec!(50000),
            10,
            dec!(500),
            dec!(49000),
            dec!(55000),
            SignalKind::Crossover,
            IndicatorSnapshot::default(),
            Utc::now() + Duration::hours(24),
        )
    }

    #[test]
    fn test_pnl_pct_scales_with_leverage() {
        let position = long_position();
        // +1% price move at 10x leverage = +10% on margin.
        assert_eq!(position.unrealized_pnl_pct(dec!(50500)), dec!(10));
        assert_eq!(position.unrealized_pnl_pct(dec!(49500)), dec!(-10));
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut position = long_position();
        position.side = PositionSide::Short;
        assert!(position.unrealized_pnl_pct(dec!(49500)) > Decimal::ZERO);
        assert!(position.unrealized_pnl_pct(dec!(50500)) < Decimal::ZERO);
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut position = long_position();
        assert!(position.transition(PositionStatus::Open).is_err()); // no skipping
        position.transition(PositionStatus::Building).unwrap();
        position.transition(PositionStatus::Open).unwrap();
        assert!(position.transition(PositionStatus::Building).is_err()); // no reversal
        position.close(dec!(51000), dec!(100), ExitReason::Manual, Utc::now()).unwrap();
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.quantity, Decimal::ZERO);
    }

    #[test]
    fn test_cancel_only_before_open() {
        let mut position = long_position();
        position.transition(PositionStatus::Building).unwrap();
        position.transition(PositionStatus::Open).unwrap();
        assert!(position.transition(PositionStatus::Cancelled).is_err());
    }

    #[test]
    fn test_stop_loss_only_tightens() {
        let mut position = long_position();
        assert!(position.tighten_stop_loss(dec!(49500)));
        assert_eq!(position.stop_loss_price, dec!(49500));
        // Loosening is ignored.
        assert!(!position.tighten_stop_loss(dec!(48000)));
        assert_eq!(position.stop_loss_price, dec!(49500));
    }

    #[test]
    fn test_trailing_ratchet_never_retreats() {
        let mut position = long_position();
        position.activate_trailing(dec!(50250));
        assert!(position.ratchet_trailing(dec!(50500)));
        assert!(!position.ratchet_trailing(dec!(50100)));
        assert_eq!(position.trailing.trail_price, Some(dec!(50500)));

        assert!(!position.trailing_breached(dec!(50600)));
        assert!(position.trailing_breached(dec!(50400)));
    }

    #[test]
    fn test_counterpart_links_once() {
        let mut position = long_position();
        let other = Uuid::new_v4();
        position.link_counterpart(other).unwrap();
        assert_eq!(position.counterpart(), Some(other));
        assert!(position.link_counterpart(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_high_water_mark() {
        let mut position = long_position();
        assert!(position.record_high_water(dec!(1.5)));
        assert!(!position.record_high_water(dec!(1.0)));
        assert!(position.record_high_water(dec!(2.0)));
        assert_eq!(position.high_water_pnl_pct, dec!(2.0));
    }
}
