//! Execution engine.
//!
//! The engine is the only writer of position and account state. The scan
//! loop calls `evaluate` per symbol to turn signals into entries; monitor
//! tasks call `evaluate_exits` per position to run the exit state machine.
//! When paper mirroring is on, the engine holds both ledger sides and
//! performs the synchronization itself; neither side references the other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use perp_config::StrategySettings;
use perp_core::error::{EngineError, EngineResult};
use perp_core::traits::{
    AccountRepository, AuditEntry, AuditRepository, Decision, ExchangeGateway, MarketData,
    OpenRequest, PositionRepository,
};
use perp_core::types::{
    AccountBalance, ExitReason, Order, OrderPurpose, Position, PositionSide, PositionStatus, Side,
    Signal, SignalKind, Timeframe,
};
use perp_ledger::{Blacklist, WriterRegistry};
use perp_regime::RegimeGate;
use perp_signals::SignalDetector;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::exits::{ExitContext, ExitDecision, ExitEvaluator};
use crate::gates::{is_chasing, CooldownTracker, GateBlock};
use crate::sizing::{entry_quantity, risk_prices, VolatilityProfile};

/// One side of the paper/live pair: a gateway plus its position and
/// account ledgers.
#[derive(Clone)]
pub struct LedgerSide {
    pub gateway: Arc<dyn ExchangeGateway>,
    pub positions: Arc<dyn PositionRepository>,
    pub account: Arc<dyn AccountRepository>,
}

/// Outcome of one monitoring tick, consumed by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitTick {
    /// Position still open, keep monitoring
    Open,
    /// Position closed this tick
    Closed(ExitReason),
    /// Position is terminal or gone; stop monitoring
    Finished,
}

/// Read-only engine state for status output.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub open_positions: Vec<Position>,
    pub balance: AccountBalance,
    pub mirror_balance: Option<AccountBalance>,
    pub resting_entries: usize,
}

pub struct ExecutionEngine {
    strategy: StrategySettings,
    data: Arc<dyn MarketData>,
    detector: SignalDetector,
    exits: ExitEvaluator,
    regime: Arc<RegimeGate>,
    primary: LedgerSide,
    mirror: Option<LedgerSide>,
    audit: Arc<dyn AuditRepository>,
    blacklist: Arc<Blacklist>,
    writers: WriterRegistry,
    cooldowns: CooldownTracker,
    /// Resting limit entries awaiting fill or expiry
    resting: RwLock<Vec<Order>>,
    /// Exchange-side conditional order per position
    algo_ids: RwLock<HashMap<Uuid, String>>,
    /// Last signal timestamp acted on per symbol; makes `evaluate`
    /// idempotent within a tick
    acted: RwLock<HashMap<String, i64>>,
}

impl ExecutionEngine {
    pub fn new(
        strategy: StrategySettings,
        data: Arc<dyn MarketData>,
        regime: Arc<RegimeGate>,
        primary: LedgerSide,
        mirror: Option<LedgerSide>,
        audit: Arc<dyn AuditRepository>,
        blacklist: Arc<Blacklist>,
    ) -> EngineResult<Self> {
        strategy.validate().map_err(EngineError::Config)?;
        let detector = SignalDetector::new(
            strategy.detector.clone(),
            strategy.filters.clone(),
            Arc::clone(&data),
        )?;
        let exits = ExitEvaluator::new(
            strategy.exits.clone(),
            strategy.detector.fast_period,
            strategy.detector.slow_period,
        );
        Ok(Self {
            strategy,
            data,
            detector,
            exits,
            regime,
            primary,
            mirror,
            audit,
            blacklist,
            writers: WriterRegistry::new(),
            cooldowns: CooldownTracker::new(),
            resting: RwLock::new(Vec::new()),
            algo_ids: RwLock::new(HashMap::new()),
            acted: RwLock::new(HashMap::new()),
        })
    }

    pub fn strategy(&self) -> &StrategySettings {
        &self.strategy
    }

    /// All non-terminal positions on the primary ledger.
    pub async fn open_positions(&self) -> EngineResult<Vec<Position>> {
        Ok(self.primary.positions.find_open().await?)
    }

    /// Read-only state snapshot.
    pub async fn snapshot(&self) -> EngineResult<EngineSnapshot> {
        let mirror_balance = match &self.mirror {
            Some(side) => Some(side.account.balance().await?),
            None => None,
        };
        Ok(EngineSnapshot {
            open_positions: self.primary.positions.find_open().await?,
            balance: self.primary.account.balance().await?,
            mirror_balance,
            resting_entries: self.resting.read().await.len(),
        })
    }

    // ------------------------------------------------------------------
    // Opening path
    // ------------------------------------------------------------------

    /// Run one scan tick for a symbol: detect, gate, open. Idempotent per
    /// tick; the same confirmed-candle signal is acted on at most once.
    pub async fn evaluate(&self, symbol: &str) -> EngineResult<Option<Uuid>> {
        let Some(signal) = self.detector.detect(symbol).await? else {
            return Ok(None);
        };
        if self.already_acted(&signal).await {
            debug!(symbol, kind = %signal.kind, "Signal already acted on this candle");
            return Ok(None);
        }
        let mark = match self.data.current_price(symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                debug!(symbol, "No current price, skipping evaluation");
                return Ok(None);
            }
            Err(e) => {
                warn!(symbol, error = %e, "Price fetch failed, skipping evaluation");
                return Ok(None);
            }
        };

        let now = Utc::now();
        match self.gate_check(&signal, mark, now).await? {
            GateOutcome::Blocked(block) => {
                info!(symbol, kind = %signal.kind, %block, "Signal dropped by gate");
                self.audit_drop(&signal, block.to_string()).await;
                Ok(None)
            }
            GateOutcome::Clear { boost } => self.open_position(signal, mark, boost, now).await,
        }
    }

    /// Bucket a signal by the entry-timeframe candle it was confirmed on,
    /// so re-evaluating within the same candle is a no-op.
    fn candle_bucket(&self, signal: &Signal) -> i64 {
        signal.timestamp / self.strategy.detector.mid_timeframe.as_millis()
    }

    async fn already_acted(&self, signal: &Signal) -> bool {
        self.acted.read().await.get(&signal.symbol) == Some(&self.candle_bucket(signal))
    }

    async fn gate_check(
        &self,
        signal: &Signal,
        mark: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<GateOutcome> {
        let gates = &self.strategy.gates;
        let open_rows = self
            .primary
            .positions
            .find_open_for_symbol(&signal.symbol)
            .await?;

        if open_rows.iter().any(|p| p.side == signal.direction.opposite()) {
            return Ok(GateOutcome::Blocked(GateBlock::OppositeSide));
        }
        let same_side = open_rows
            .iter()
            .filter(|p| p.side == signal.direction)
            .count();
        if same_side >= gates.max_positions_per_side {
            return Ok(GateOutcome::Blocked(GateBlock::SideCap {
                count: same_side,
                cap: gates.max_positions_per_side,
            }));
        }

        // A limit entry only places a resting order, so the cooldown and
        // anti-chase gates do not apply to it
        let resting_entry = signal.kind == SignalKind::LimitEntry;
        if !resting_entry {
            if let Some(remaining) = self
                .cooldowns
                .remaining(&signal.symbol, signal.direction, now, gates.cooldown_secs)
                .await
            {
                return Ok(GateOutcome::Blocked(GateBlock::Cooldown {
                    remaining_secs: remaining.num_seconds(),
                }));
            }
        }

        if let Some(reason) = self
            .blacklist
            .blocks(&signal.symbol, signal.kind, signal.direction, now)
            .await
        {
            return Ok(GateOutcome::Blocked(GateBlock::Blacklisted { reason }));
        }

        if !resting_entry {
            if let Ok(Some(range)) = self.data.range_24h(&signal.symbol).await {
                let percentile = range.percentile(mark);
                if is_chasing(percentile, signal.direction, gates.chase_range_fraction) {
                    return Ok(GateOutcome::Blocked(GateBlock::Chasing { percentile }));
                }
            }
        }

        let assessment = self.regime.assess_at(now.timestamp_millis()).await;
        if assessment.vetoes(signal.direction, self.strategy.regime.veto_strength_pct) {
            return Ok(GateOutcome::Blocked(GateBlock::RegimeVeto {
                strength_pct: assessment.strength_pct,
            }));
        }
        if self
            .regime
            .entry_blocked(signal.direction, now.timestamp_millis())
            .await
        {
            return Ok(GateOutcome::Blocked(GateBlock::EmergencyLock));
        }

        Ok(GateOutcome::Clear {
            boost: assessment.boosts(signal.direction),
        })
    }

    async fn open_position(
        &self,
        signal: Signal,
        mark: Decimal,
        boost: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Uuid>> {
        let mut margin = self.strategy.margin_per_position;
        if boost {
            margin *= self.strategy.regime.boost_factor;
            debug!(symbol = %signal.symbol, %margin, "Basket agrees, entry sized up");
        }

        let precision = match self.primary.gateway.precision(&signal.symbol).await {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "Precision fetch failed, skipping entry");
                return Ok(None);
            }
        };
        let entry_ref = signal
            .limit_price
            .and_then(Decimal::from_f64)
            .map(|p| precision.round_price(p))
            .unwrap_or(mark);
        let quantity = entry_quantity(margin, self.strategy.leverage, entry_ref, &precision);
        if quantity < precision.min_quantity {
            self.audit_drop(
                &signal,
                format!("quantity {quantity} below exchange minimum {}", precision.min_quantity),
            )
            .await;
            return Ok(None);
        }

        if let Err(e) = self.primary.account.freeze(margin).await {
            self.audit_drop(&signal, format!("margin unavailable: {e}")).await;
            return Ok(None);
        }

        let scale = self.stop_scale(&signal.symbol).await;
        let (stop_loss, take_profit) = risk_prices(
            signal.direction,
            entry_ref,
            self.strategy.leverage,
            self.strategy.exits.stop_loss_pct,
            self.strategy.exits.max_take_profit_pct,
            scale,
            &precision,
        );

        let request = OpenRequest {
            symbol: signal.symbol.clone(),
            side: signal.direction,
            quantity,
            leverage: self.strategy.leverage,
            limit_price: signal.limit_price.and_then(Decimal::from_f64).map(|p| precision.round_price(p)),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
        };
        let receipt = match self.primary.gateway.open(request.clone()).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "Entry order failed");
                if let Err(release_err) = self.primary.account.release(margin, Decimal::ZERO).await
                {
                    warn!(error = %release_err, "Margin release after failed entry");
                }
                self.audit_drop(&signal, format!("order failed: {e}")).await;
                return Ok(None);
            }
        };

        // The order is confirmed; only now does a row exist
        let mut position = Position::new(
            signal.symbol.clone(),
            signal.direction,
            quantity,
            receipt.avg_price.unwrap_or(entry_ref),
            self.strategy.leverage,
            margin,
            stop_loss,
            take_profit,
            signal.kind,
            signal.snapshot,
            now + Duration::hours(self.strategy.gates.position_timeout_hours as i64),
        );

        if let Some(limit_price) = request.limit_price {
            if receipt.filled_quantity.is_zero() {
                let id = position.id;
                self.primary.positions.create(position).await?;
                let mut order = Order::limit(
                    signal.symbol.clone(),
                    Side::opening(signal.direction),
                    OrderPurpose::Open,
                    quantity,
                    limit_price,
                )
                .for_position(id)
                .expiring_at(
                    now + Duration::seconds(self.strategy.gates.limit_entry_ttl_secs as i64),
                );
                order.exchange_order_id = Some(receipt.order_id);
                self.resting.write().await.push(order);
                info!(symbol = %signal.symbol, %id, %limit_price, "Resting limit entry placed");
                self.mark_acted(&signal).await;
                self.record_audit(Decision::Opened {
                    position_id: id,
                    signal,
                })
                .await;
                return Ok(Some(id));
            }
        }

        position.transition(PositionStatus::Building)?;
        position.transition(PositionStatus::Open)?;
        let id = position.id;

        if let Some(mirror_id) = self.mirror_open(&request, &position, margin).await {
            position.link_counterpart(mirror_id)?;
        }
        self.primary.positions.create(position).await?;
        self.attach_stop(&signal.symbol, signal.direction, id, stop_loss, Some(take_profit))
            .await;

        self.cooldowns.record(&signal.symbol, signal.direction, now).await;
        self.mark_acted(&signal).await;
        info!(
            symbol = %signal.symbol,
            %id,
            side = %signal.direction,
            %quantity,
            kind = %signal.kind,
            "Position opened"
        );
        self.record_audit(Decision::Opened {
            position_id: id,
            signal,
        })
        .await;
        Ok(Some(id))
    }

    /// Open the paper counterpart of a live entry. Best effort: a mirror
    /// failure never blocks the primary entry.
    async fn mirror_open(
        &self,
        request: &OpenRequest,
        primary: &Position,
        margin: Decimal,
    ) -> Option<Uuid> {
        let mirror = self.mirror.as_ref()?;
        if let Err(e) = mirror.account.freeze(margin).await {
            warn!(error = %e, "Mirror margin freeze failed, mirror entry skipped");
            return None;
        }
        let receipt = match mirror.gateway.open(request.clone()).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Mirror entry failed");
                if let Err(release_err) = mirror.account.release(margin, Decimal::ZERO).await {
                    warn!(error = %release_err, "Mirror margin release failed");
                }
                return None;
            }
        };
        let mut shadow = Position::new(
            primary.symbol.clone(),
            primary.side,
            primary.quantity,
            receipt.avg_price.unwrap_or(primary.entry_price),
            primary.leverage,
            margin,
            primary.stop_loss_price,
            primary.take_profit_price,
            primary.signal_kind,
            primary.entry_snapshot,
            primary.planned_close_at,
        );
        if shadow.transition(PositionStatus::Building).is_err()
            || shadow.transition(PositionStatus::Open).is_err()
        {
            return None;
        }
        if shadow.link_counterpart(primary.id).is_err() {
            return None;
        }
        let shadow_id = shadow.id;
        match mirror.positions.create(shadow).await {
            Ok(()) => Some(shadow_id),
            Err(e) => {
                warn!(error = %e, "Mirror row create failed");
                None
            }
        }
    }

    async fn attach_stop(
        &self,
        symbol: &str,
        side: PositionSide,
        position_id: Uuid,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) {
        match self
            .primary
            .gateway
            .set_stop(symbol, side, stop_loss, take_profit)
            .await
        {
            Ok(algo_id) => {
                self.algo_ids.write().await.insert(position_id, algo_id);
            }
            // The monitor enforces the stop anyway; the conditional order
            // is the exchange-side copy
            Err(e) => warn!(symbol, error = %e, "Conditional stop placement failed"),
        }
    }

    async fn stop_scale(&self, symbol: &str) -> Decimal {
        if !self.strategy.exits.volatility_override {
            return Decimal::ONE;
        }
        match self.data.range_24h(symbol).await {
            Ok(Some(range)) => VolatilityProfile::classify(range.width_pct()).stop_scale(),
            _ => Decimal::ONE,
        }
    }

    // ------------------------------------------------------------------
    // Exit path
    // ------------------------------------------------------------------

    /// Run one monitoring tick for a position. Holds the single-writer
    /// lease for the duration; a concurrent tick on the same id fails
    /// instead of racing.
    pub async fn evaluate_exits(&self, position_id: Uuid) -> EngineResult<ExitTick> {
        let _lease = self.writers.acquire(position_id)?;

        let Some(mut position) = self.primary.positions.find_by_id(position_id).await? else {
            return Ok(ExitTick::Finished);
        };
        if position.status.is_terminal() {
            return Ok(ExitTick::Finished);
        }
        if position.status != PositionStatus::Open {
            // Resting limit entry; fills and expiry are handled by the
            // resting sweep, not the exit machine
            return Ok(ExitTick::Open);
        }

        let price = match self.data.current_price(&position.symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => return Ok(ExitTick::Open),
            Err(e) => {
                debug!(symbol = %position.symbol, error = %e, "Price fetch failed, tick skipped");
                return Ok(ExitTick::Open);
            }
        };
        let fast_closes = self
            .confirmed_closes(&position.symbol, self.strategy.detector.fast_timeframe)
            .await;
        let mid_closes = self
            .confirmed_closes(&position.symbol, self.strategy.detector.mid_timeframe)
            .await;

        let now = Utc::now();
        let trail_before = position.trailing.trail_price;
        let decision = self.exits.evaluate(
            &mut position,
            &ExitContext {
                price,
                now,
                fast_closes: &fast_closes,
                mid_closes: &mid_closes,
            },
        );

        match decision {
            ExitDecision::Hold => {
                // One atomic write per tick carries the bookkeeping
                self.primary.positions.update(&position).await?;
                if position.trailing.trail_price != trail_before {
                    self.sync_exchange_stop(&position).await;
                }
                Ok(ExitTick::Open)
            }
            ExitDecision::PartialTake { fraction } => {
                self.partial_close(position, fraction).await
            }
            ExitDecision::Close { reason } => self.close_position(position, reason, now).await,
        }
    }

    async fn confirmed_closes(&self, symbol: &str, timeframe: Timeframe) -> Vec<f64> {
        match self
            .data
            .candles(symbol, timeframe, self.strategy.detector.candle_limit)
            .await
        {
            Ok(Some(series)) => series.confirmed_closes(Utc::now().timestamp_millis()),
            _ => Vec::new(),
        }
    }

    /// Keep the exchange-side conditional order in step with the trailing
    /// price. Best effort; the monitor remains the enforcer.
    async fn sync_exchange_stop(&self, position: &Position) {
        let Some(trail) = position.trailing.trail_price else {
            return;
        };
        let algo_id = self.algo_ids.read().await.get(&position.id).cloned();
        let Some(algo_id) = algo_id else { return };
        match self
            .primary
            .gateway
            .replace_stop(&position.symbol, &algo_id, trail, None)
            .await
        {
            Ok(new_id) => {
                self.algo_ids.write().await.insert(position.id, new_id);
            }
            Err(e) => debug!(symbol = %position.symbol, error = %e, "Stop replace failed"),
        }
    }

    /// Take down the exchange-side conditional order once the position it
    /// protected is gone. Best effort; a stale stop on the venue must not
    /// survive the close.
    async fn cancel_exchange_stop(&self, position_id: Uuid, symbol: &str) {
        let algo_id = self.algo_ids.write().await.remove(&position_id);
        let Some(algo_id) = algo_id else { return };
        if let Err(e) = self.primary.gateway.cancel_stop(symbol, &algo_id).await {
            warn!(symbol, error = %e, "Conditional order cancel after close failed");
        }
    }

    async fn partial_close(
        &self,
        mut position: Position,
        fraction: Decimal,
    ) -> EngineResult<ExitTick> {
        let take = position.quantity * fraction;
        let receipt = match self
            .primary
            .gateway
            .close(&position.symbol, position.side, Some(take))
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Partial take failed");
                self.primary.positions.update(&position).await?;
                return Ok(ExitTick::Open);
            }
        };
        // Margin comes back in proportion to what actually closed, which
        // under a partial fill is less than the requested fraction
        let released = if position.quantity.is_zero() {
            Decimal::ZERO
        } else {
            position.margin * receipt.filled_quantity / position.quantity
        };
        position.quantity -= receipt.filled_quantity;
        position.margin -= released;

        if position.quantity.is_zero() {
            // The venue flattened the whole position; finish the close
            let now = Utc::now();
            position.close(receipt.avg_price, receipt.realized_pnl, ExitReason::TrailingStop, now)?;
            self.primary.positions.update(&position).await?;
            self.primary
                .account
                .release(released, receipt.realized_pnl)
                .await?;
            self.cancel_exchange_stop(position.id, &position.symbol).await;
            self.cooldowns
                .record(&position.symbol, position.side, now)
                .await;
            self.record_audit(Decision::Closed {
                position_id: position.id,
                reason: ExitReason::TrailingStop,
                realized_pnl: receipt.realized_pnl,
            })
            .await;
            return Ok(ExitTick::Closed(ExitReason::TrailingStop));
        }

        self.primary.positions.update(&position).await?;
        self.primary
            .account
            .release(released, receipt.realized_pnl)
            .await?;
        info!(
            symbol = %position.symbol,
            id = %position.id,
            quantity = %receipt.filled_quantity,
            realized = %receipt.realized_pnl,
            "Partial profit taken at trailing activation"
        );
        Ok(ExitTick::Open)
    }

    async fn close_position(
        &self,
        mut position: Position,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> EngineResult<ExitTick> {
        let receipt = match self
            .primary
            .gateway
            .close(&position.symbol, position.side, None)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                // The position stays open; the next tick retries through
                // the same path
                warn!(symbol = %position.symbol, id = %position.id, error = %e, "Close failed");
                self.primary.positions.update(&position).await?;
                self.record_audit(Decision::CloseFailed {
                    position_id: position.id,
                    error: e.to_string(),
                })
                .await;
                return Ok(ExitTick::Open);
            }
        };

        position.close(receipt.avg_price, receipt.realized_pnl, reason, now)?;
        self.primary.positions.update(&position).await?;
        self.primary
            .account
            .release(position.margin, receipt.realized_pnl)
            .await?;
        self.cooldowns
            .record(&position.symbol, position.side, now)
            .await;
        self.cancel_exchange_stop(position.id, &position.symbol).await;
        info!(
            symbol = %position.symbol,
            id = %position.id,
            %reason,
            realized = %receipt.realized_pnl,
            "Position closed"
        );
        self.record_audit(Decision::Closed {
            position_id: position.id,
            reason,
            realized_pnl: receipt.realized_pnl,
        })
        .await;

        self.mirror_close(&position, reason, now).await;
        Ok(ExitTick::Closed(reason))
    }

    /// Close the paper counterpart of a closed live position. Best effort.
    async fn mirror_close(&self, position: &Position, reason: ExitReason, now: DateTime<Utc>) {
        let (Some(mirror), Some(counterpart_id)) = (&self.mirror, position.counterpart()) else {
            return;
        };
        let shadow = match mirror.positions.find_by_id(counterpart_id).await {
            Ok(Some(shadow)) if !shadow.status.is_terminal() => shadow,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Mirror row lookup failed");
                return;
            }
        };
        let receipt = match mirror
            .gateway
            .close(&shadow.symbol, shadow.side, None)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "Mirror close failed");
                return;
            }
        };
        let mut shadow = shadow;
        if shadow
            .close(receipt.avg_price, receipt.realized_pnl, reason, now)
            .is_ok()
        {
            if let Err(e) = mirror.positions.update(&shadow).await {
                warn!(error = %e, "Mirror row update failed");
            }
            if let Err(e) = mirror
                .account
                .release(shadow.margin, receipt.realized_pnl)
                .await
            {
                warn!(error = %e, "Mirror margin release failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Emergency flatten and housekeeping
    // ------------------------------------------------------------------

    /// Scan the reference basket for a synchronized reversal; on detection
    /// the lock engages and every open position on the implied side is
    /// flattened at market.
    pub async fn check_regime(&self) -> EngineResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let Some(event) = self.regime.check_reversal(now_ms).await else {
            return Ok(0);
        };
        self.flatten_side(event.flatten_side(), ExitReason::EmergencyFlatten)
            .await
    }

    /// Close every open position on one side. Returns the number closed.
    pub async fn flatten_side(&self, side: PositionSide, reason: ExitReason) -> EngineResult<usize> {
        let open = self.primary.positions.find_open().await?;
        let mut closed = 0;
        let now = Utc::now();
        for position in open {
            if position.side != side || position.status != PositionStatus::Open {
                continue;
            }
            // A monitor task may hold the lease; it will close the
            // position itself on its next tick
            let Ok(_lease) = self.writers.acquire(position.id) else {
                warn!(id = %position.id, "Position busy during flatten, skipped");
                continue;
            };
            if matches!(
                self.close_position(position, reason, now).await?,
                ExitTick::Closed(_)
            ) {
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Promote filled resting entries and cancel expired ones. Fills are
    /// keyed on the venue's own order, never inferred from position
    /// listings, so an unrelated position on the same symbol and side
    /// cannot masquerade as a fill.
    pub async fn sweep_resting(&self, now: DateTime<Utc>) -> EngineResult<()> {
        let entries: Vec<Order> = self.resting.read().await.clone();
        if entries.is_empty() {
            return Ok(());
        }
        let mut done: Vec<Uuid> = Vec::new();

        for order in entries {
            let (Some(position_id), Some(exchange_id)) =
                (order.position_id, order.exchange_order_id.clone())
            else {
                done.push(order.id);
                continue;
            };
            let Some(mut position) = self.primary.positions.find_by_id(position_id).await? else {
                done.push(order.id);
                continue;
            };
            let side = match order.side {
                Side::Buy => PositionSide::Long,
                Side::Sell => PositionSide::Short,
            };
            let state = match self
                .primary
                .gateway
                .order_state(&order.symbol, &exchange_id)
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    debug!(symbol = %order.symbol, error = %e, "Order lookup failed, sweep deferred");
                    continue;
                }
            };

            if state.filled_quantity >= order.quantity {
                self.promote_resting(position, side, state.avg_price, now).await?;
                done.push(order.id);
            } else if !state.live && state.filled_quantity.is_zero() {
                // Cancelled on the venue side
                position.transition(PositionStatus::Cancelled)?;
                self.primary.positions.update(&position).await?;
                self.primary
                    .account
                    .release(position.margin, Decimal::ZERO)
                    .await?;
                info!(symbol = %order.symbol, id = %position_id, "Resting entry gone from venue, cancelled");
                done.push(order.id);
            } else if order.is_expired(now) {
                if state.live {
                    if let Err(e) = self
                        .primary
                        .gateway
                        .cancel_order(&order.symbol, &exchange_id)
                        .await
                    {
                        warn!(symbol = %order.symbol, error = %e, "Expired entry cancel failed, retrying next sweep");
                        continue;
                    }
                }
                if state.filled_quantity.is_zero() {
                    position.transition(PositionStatus::Cancelled)?;
                    self.primary.positions.update(&position).await?;
                    self.primary
                        .account
                        .release(position.margin, Decimal::ZERO)
                        .await?;
                    info!(symbol = %order.symbol, id = %position_id, "Resting entry expired and cancelled");
                } else {
                    // Partially filled at expiry: keep the filled slice,
                    // return the margin behind the unfilled remainder
                    let unfilled =
                        position.margin * (Decimal::ONE - state.filled_quantity / order.quantity);
                    position.margin -= unfilled;
                    position.quantity = state.filled_quantity;
                    self.promote_resting(position, side, state.avg_price, now).await?;
                    self.primary.account.release(unfilled, Decimal::ZERO).await?;
                }
                done.push(order.id);
            }
        }

        self.resting
            .write()
            .await
            .retain(|o| !done.contains(&o.id));
        Ok(())
    }

    /// Open the ledger row behind a filled resting entry.
    async fn promote_resting(
        &self,
        mut position: Position,
        side: PositionSide,
        fill_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        position.transition(PositionStatus::Building)?;
        position.transition(PositionStatus::Open)?;
        if let Some(price) = fill_price {
            position.entry_price = price;
        }
        self.primary.positions.update(&position).await?;
        self.cooldowns.record(&position.symbol, side, now).await;
        self.attach_stop(
            &position.symbol,
            side,
            position.id,
            position.stop_loss_price,
            Some(position.take_profit_price),
        )
        .await;
        info!(symbol = %position.symbol, id = %position.id, "Resting entry filled, position open");
        Ok(())
    }

    /// Manually close one position (operator action).
    pub async fn close_manual(&self, position_id: Uuid) -> EngineResult<ExitTick> {
        let _lease = self.writers.acquire(position_id)?;
        let Some(position) = self.primary.positions.find_by_id(position_id).await? else {
            return Ok(ExitTick::Finished);
        };
        if position.status != PositionStatus::Open {
            return Ok(ExitTick::Finished);
        }
        self.close_position(position, ExitReason::Manual, Utc::now())
            .await
    }

    // ------------------------------------------------------------------

    async fn mark_acted(&self, signal: &Signal) {
        let bucket = self.candle_bucket(signal);
        self.acted.write().await.insert(signal.symbol.clone(), bucket);
    }

    async fn audit_drop(&self, signal: &Signal, reason: String) {
        self.record_audit(Decision::SignalDropped {
            symbol: signal.symbol.clone(),
            signal_kind: signal.kind,
            direction: signal.direction,
            reason,
        })
        .await;
    }

    async fn record_audit(&self, decision: Decision) {
        let entry = AuditEntry {
            at: Utc::now(),
            decision,
        };
        if let Err(e) = self.audit.record(entry).await {
            warn!(error = %e, "Audit write failed");
        }
    }
}

enum GateOutcome {
    Blocked(GateBlock),
    Clear { boost: bool },
}
