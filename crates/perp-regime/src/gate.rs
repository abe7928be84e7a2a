//! Regime gate: basket assessment, veto/boost, and the emergency lock.

use std::sync::Arc;

use chrono::Utc;
use perp_config::RegimeSettings;
use perp_core::traits::MarketData;
use perp_core::types::{CandleSeries, PositionSide, Timeframe};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classify::{net_power, window_strength, MemberTrend, RegimeBias};
use crate::reversal::{self, ReversalEvent};

/// Aggregated basket read for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RegimeAssessment {
    pub bias: RegimeBias,
    /// Mean strength of agreeing members, percent
    pub strength_pct: f64,
    /// Members sharing the majority bias
    pub agreeing: usize,
    /// Members with data this evaluation
    pub total: usize,
}

impl RegimeAssessment {
    /// Whether the basket opposes `direction` hard enough to drop the
    /// signal entirely.
    pub fn vetoes(&self, direction: PositionSide, threshold_pct: f64) -> bool {
        let opposing = match self.bias {
            RegimeBias::Bullish => direction == PositionSide::Short,
            RegimeBias::Bearish => direction == PositionSide::Long,
            RegimeBias::Neutral => false,
        };
        opposing && self.strength_pct >= threshold_pct
    }

    /// Whether the basket agrees with `direction`; agreeing entries may be
    /// sized up.
    pub fn boosts(&self, direction: PositionSide) -> bool {
        match self.bias {
            RegimeBias::Bullish => direction == PositionSide::Long,
            RegimeBias::Bearish => direction == PositionSide::Short,
            RegimeBias::Neutral => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EmergencyLock {
    blocked: PositionSide,
    until_ms: i64,
}

/// Cross-asset market regime gate over a fixed reference basket.
pub struct RegimeGate {
    settings: RegimeSettings,
    fast_period: usize,
    slow_period: usize,
    data: Arc<dyn MarketData>,
    lock: RwLock<Option<EmergencyLock>>,
}

impl RegimeGate {
    /// Create a gate. The EMA pair is shared with the signal detector so
    /// both measure trend strength the same way.
    pub fn new(
        settings: RegimeSettings,
        fast_period: usize,
        slow_period: usize,
        data: Arc<dyn MarketData>,
    ) -> Self {
        Self {
            settings,
            fast_period,
            slow_period,
            data,
            lock: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &RegimeSettings {
        &self.settings
    }

    /// Assess the basket at the current wall clock.
    pub async fn assess(&self) -> RegimeAssessment {
        self.assess_at(Utc::now().timestamp_millis()).await
    }

    /// Assess the basket at an explicit evaluation time.
    pub async fn assess_at(&self, now_ms: i64) -> RegimeAssessment {
        let mut members = Vec::with_capacity(self.settings.basket.len());
        for symbol in &self.settings.basket {
            if let Some(trend) = self.member_trend(symbol, now_ms).await {
                members.push(trend);
            } else {
                debug!(symbol, "No basket data, member skipped");
            }
        }
        aggregate(&members)
    }

    async fn member_trend(&self, symbol: &str, now_ms: i64) -> Option<MemberTrend> {
        let mut net = 0;
        let mut strength_sum = 0.0;
        let mut windows = 0;
        for &timeframe in &self.settings.timeframes {
            let Some(series) = self.fetch(symbol, timeframe, self.candle_budget()).await else {
                continue;
            };
            let confirmed =
                series.confirmed_last_n(self.settings.lookback_candles, now_ms);
            if confirmed.is_empty() {
                continue;
            }
            net += net_power(&confirmed);
            strength_sum += window_strength(
                &series.confirmed_closes(now_ms),
                self.fast_period,
                self.slow_period,
            );
            windows += 1;
        }
        if windows == 0 {
            return None;
        }
        Some(MemberTrend {
            net_power: net,
            strength_pct: strength_sum / windows as f64,
        })
    }

    /// Scan for a synchronized reversal and engage the emergency lock when
    /// one is found. Returns the event so the caller can flatten.
    pub async fn check_reversal(&self, now_ms: i64) -> Option<ReversalEvent> {
        let timeframe = *self.settings.timeframes.first()?;
        let lookback =
            (self.settings.reversal_lookback_hours * 3600 / timeframe.as_secs()) as usize;

        let mut members: Vec<CandleSeries> = Vec::new();
        for symbol in &self.settings.basket {
            match self.fetch(symbol, timeframe, lookback).await {
                Some(series) => members.push(series),
                None => debug!(symbol, "No candles for reversal scan"),
            }
        }
        let windows: Vec<Vec<&perp_core::types::Candle>> = members
            .iter()
            .map(|s| s.confirmed_last_n(lookback, now_ms))
            .collect();

        let event = reversal::scan(
            &windows,
            self.settings.reversal_retrace_pct,
            self.settings.reversal_sync_candles,
            self.settings.reversal_min_members,
            now_ms,
        )?;
        warn!(
            kind = ?event.kind,
            members = event.members,
            avg_retrace_pct = event.avg_retrace_pct,
            "Synchronized basket reversal detected"
        );
        self.engage_lock(&event, now_ms).await;
        Some(event)
    }

    /// Block new entries on the reversal's old-trend side for the
    /// configured window.
    pub async fn engage_lock(&self, event: &ReversalEvent, now_ms: i64) {
        let until_ms = now_ms + self.settings.emergency_lock_secs as i64 * 1000;
        let mut lock = self.lock.write().await;
        *lock = Some(EmergencyLock {
            blocked: event.blocked_side(),
            until_ms,
        });
        info!(
            blocked = ?event.blocked_side(),
            until_ms,
            "Emergency entry lock engaged"
        );
    }

    /// Whether a new entry in `direction` is currently blocked.
    pub async fn entry_blocked(&self, direction: PositionSide, now_ms: i64) -> bool {
        let guard = self.lock.read().await;
        match *guard {
            Some(lock) if now_ms < lock.until_ms => lock.blocked == direction,
            _ => false,
        }
    }

    fn candle_budget(&self) -> usize {
        // Strength needs a full slow EMA window even when net power only
        // looks at a short lookback
        self.settings.lookback_candles.max(self.slow_period + 2)
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Option<CandleSeries> {
        match self.data.candles(symbol, timeframe, limit).await {
            Ok(series) => series,
            Err(e) => {
                debug!(symbol, %timeframe, error = %e, "Basket fetch failed");
                None
            }
        }
    }
}

fn aggregate(members: &[MemberTrend]) -> RegimeAssessment {
    let total = members.len();
    let bullish = members
        .iter()
        .filter(|m| m.bias() == RegimeBias::Bullish)
        .count();
    let bearish = members
        .iter()
        .filter(|m| m.bias() == RegimeBias::Bearish)
        .count();

    let (bias, agreeing) = if total > 0 && bullish * 2 > total {
        (RegimeBias::Bullish, bullish)
    } else if total > 0 && bearish * 2 > total {
        (RegimeBias::Bearish, bearish)
    } else {
        (RegimeBias::Neutral, 0)
    };

    let strength_pct = if agreeing > 0 {
        members
            .iter()
            .filter(|m| m.bias() == bias)
            .map(|m| m.strength_pct)
            .sum::<f64>()
            / agreeing as f64
    } else {
        0.0
    };

    RegimeAssessment {
        bias,
        strength_pct,
        agreeing,
        total,
    }
}
