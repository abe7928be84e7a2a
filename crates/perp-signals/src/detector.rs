//! Signal detector orchestration.
//!
//! `detect` runs the individual checks in priority order against fresh
//! market data and returns the first candidate that clears the admission
//! filters. Missing market data skips the evaluation; the next scan tick
//! retries.

use std::sync::Arc;

use chrono::Utc;
use perp_config::{DetectorSettings, FilterSettings};
use perp_core::error::SignalError;
use perp_core::traits::{Indicator, MarketData, MultiOutputIndicator, OhlcvIndicator};
use perp_core::types::{
    CandleSeries, IndicatorSnapshot, PositionSide, Signal, SignalKind, Timeframe,
};
use perp_indicators::{Ema, EmaSpread, Kdj, Macd, Rsi};
use tracing::{debug, info};

use crate::crossover::CrossoverCheck;
use crate::filters::AdmissionFilters;
use crate::oscillation::{OscillationCheck, OscillationOutcome};
use crate::sustained::SustainedTrendCheck;

/// Priority-ordered signal detector for one market data source.
pub struct SignalDetector {
    settings: DetectorSettings,
    filters: AdmissionFilters,
    crossover: CrossoverCheck,
    limit_entry: CrossoverCheck,
    sustained: SustainedTrendCheck,
    oscillation: OscillationCheck,
    data: Arc<dyn MarketData>,
}

impl SignalDetector {
    pub fn new(
        settings: DetectorSettings,
        filter_settings: FilterSettings,
        data: Arc<dyn MarketData>,
    ) -> Result<Self, SignalError> {
        if settings.fast_period >= settings.slow_period {
            return Err(SignalError::InvalidConfig(
                "Fast period must be less than slow period".into(),
            ));
        }
        let crossover = CrossoverCheck::new(
            settings.fast_period,
            settings.slow_period,
            settings.min_signal_strength_pct,
        );
        let limit_entry = CrossoverCheck::new(
            settings.fast_period,
            settings.slow_period,
            settings.limit_entry_min_strength_pct,
        );
        let sustained = SustainedTrendCheck::new(
            settings.fast_period,
            settings.slow_period,
            settings.mid_period,
            settings.min_signal_strength_pct,
            settings.expansion_candles,
        );
        let oscillation =
            OscillationCheck::new(settings.oscillation_candles, settings.oscillation_band_pct);
        Ok(Self {
            settings,
            filters: AdmissionFilters::new(filter_settings),
            crossover,
            limit_entry,
            sustained,
            oscillation,
            data,
        })
    }

    /// The crossover check, shared with the exit path for reversal tests.
    pub fn crossover_check(&self) -> &CrossoverCheck {
        &self.crossover
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Detect a signal for `symbol` at the current wall clock.
    pub async fn detect(&self, symbol: &str) -> Result<Option<Signal>, SignalError> {
        self.detect_at(symbol, Utc::now().timestamp_millis()).await
    }

    /// Detect a signal with an explicit evaluation time. Candle
    /// confirmation is judged against `now_ms`.
    pub async fn detect_at(
        &self,
        symbol: &str,
        now_ms: i64,
    ) -> Result<Option<Signal>, SignalError> {
        let Some(mid) = self.fetch(symbol, self.settings.mid_timeframe).await else {
            return Ok(None);
        };
        let closes = mid.confirmed_closes(now_ms);
        if closes.len() < self.settings.slow_period + 2 {
            debug!(
                symbol,
                have = closes.len(),
                need = self.settings.slow_period + 2,
                "Not enough confirmed candles"
            );
            return Ok(None);
        }
        let price = *closes.last().unwrap();
        let snapshot = self.build_snapshot(&mid, &closes, price, now_ms);

        // 1. Crossover
        if let Some(event) = self.crossover.evaluate(&closes) {
            let candidate = Signal {
                symbol: symbol.to_string(),
                direction: event.direction,
                kind: SignalKind::Crossover,
                strength_pct: event.strength_pct,
                price,
                limit_price: None,
                reason: format!(
                    "{} crossover: fast EMA ({:.2}) crossed {} slow EMA ({:.2})",
                    direction_word(event.direction),
                    event.fast,
                    if event.direction == PositionSide::Long { "above" } else { "below" },
                    event.slow
                ),
                snapshot,
                timestamp: now_ms,
            };
            if let Some(signal) = self.admit(candidate) {
                return Ok(Some(signal));
            }
        }

        // 2. Sustained trend
        if let Some(signal) = self
            .detect_sustained(symbol, &closes, price, snapshot, now_ms)
            .await
        {
            return Ok(Some(signal));
        }

        // 3. Oscillation reversal
        let confirmed = mid.confirmed_last_n(self.settings.oscillation_candles, now_ms);
        match self.oscillation.evaluate(&confirmed) {
            OscillationOutcome::Confirmed(event) => {
                let candidate = Signal {
                    symbol: symbol.to_string(),
                    direction: event.direction,
                    kind: SignalKind::OscillationReversal,
                    strength_pct: snapshot.ema_spread_pct,
                    price,
                    limit_price: None,
                    reason: format!(
                        "Fading {:.2}% {} run, volume ratio {:.2}",
                        event.range_pct,
                        direction_word(event.direction.opposite()),
                        event.volume_ratio
                    ),
                    snapshot,
                    timestamp: now_ms,
                };
                if let Some(signal) = self.admit(candidate) {
                    return Ok(Some(signal));
                }
            }
            OscillationOutcome::VolumeUnconfirmed { ratio } => {
                info!(symbol, ratio, "Oscillation run without volume confirmation");
            }
            OscillationOutcome::NoPattern => {}
        }

        // 4. Limit entry, only when a resting offset is configured
        if let Some(offset_pct) = self.settings.limit_entry_offset_pct {
            if let Some(event) = self.limit_entry.evaluate(&closes) {
                let limit_price = match event.direction {
                    PositionSide::Long => price * (1.0 - offset_pct / 100.0),
                    PositionSide::Short => price * (1.0 + offset_pct / 100.0),
                };
                let candidate = Signal {
                    symbol: symbol.to_string(),
                    direction: event.direction,
                    kind: SignalKind::LimitEntry,
                    strength_pct: event.strength_pct,
                    price,
                    limit_price: Some(limit_price),
                    reason: format!(
                        "{} flip at {:.2}% strength, resting {:.2}% from mark",
                        direction_word(event.direction),
                        event.strength_pct,
                        offset_pct
                    ),
                    snapshot,
                    timestamp: now_ms,
                };
                if let Some(signal) = self.admit(candidate) {
                    return Ok(Some(signal));
                }
            }
        }

        Ok(None)
    }

    async fn detect_sustained(
        &self,
        symbol: &str,
        reference_closes: &[f64],
        price: f64,
        snapshot: IndicatorSnapshot,
        now_ms: i64,
    ) -> Option<Signal> {
        let slow = self.fetch(symbol, self.settings.slow_timeframe).await?;
        let fast = self.fetch(symbol, self.settings.fast_timeframe).await?;
        let event = self.sustained.evaluate(
            &slow.confirmed_closes(now_ms),
            &fast.confirmed_closes(now_ms),
            reference_closes,
            price,
        )?;
        let candidate = Signal {
            symbol: symbol.to_string(),
            direction: event.direction,
            kind: SignalKind::SustainedTrend,
            strength_pct: event.strength_pct,
            price,
            limit_price: None,
            reason: format!(
                "{} {} trend at {:.2}% with expanding {} spread",
                direction_word(event.direction),
                self.settings.slow_timeframe,
                event.strength_pct,
                self.settings.fast_timeframe
            ),
            snapshot,
            timestamp: now_ms,
        };
        self.admit(candidate)
    }

    /// Run admission filters; a rejection is logged and drops the candidate.
    fn admit(&self, candidate: Signal) -> Option<Signal> {
        match self
            .filters
            .check(candidate.direction, candidate.strength_pct, &candidate.snapshot)
        {
            Ok(()) => Some(candidate),
            Err(reject) => {
                info!(
                    symbol = %candidate.symbol,
                    kind = %candidate.kind,
                    direction = ?candidate.direction,
                    %reject,
                    "Signal rejected by admission filter"
                );
                None
            }
        }
    }

    fn build_snapshot(
        &self,
        series: &CandleSeries,
        closes: &[f64],
        price: f64,
        now_ms: i64,
    ) -> IndicatorSnapshot {
        let spread = EmaSpread::new(self.settings.fast_period, self.settings.slow_period)
            .calculate(closes);
        let ema_spread_pct = spread.last().map(|p| p.strength_pct()).unwrap_or(0.0);

        let rsi = Rsi::new(self.filters.settings().rsi_period)
            .calculate(closes)
            .last()
            .copied();
        let macd_histogram = Macd::new()
            .calculate(closes)
            .last()
            .map(|out| out.histogram);

        let n = closes.len();
        let highs: Vec<f64> = series
            .confirmed_last_n(n, now_ms)
            .iter()
            .map(|c| c.high)
            .collect();
        let lows: Vec<f64> = series
            .confirmed_last_n(n, now_ms)
            .iter()
            .map(|c| c.low)
            .collect();
        let kdj_j = Kdj::new(9, 3)
            .calculate(&highs, &lows, closes, &[])
            .last()
            .map(|out| out.j);

        let fast_ema = Ema::new(self.settings.fast_period)
            .calculate(closes)
            .last()
            .copied();
        let ma_distance_pct = match fast_ema {
            Some(ema) if ema != 0.0 => (price - ema) / ema * 100.0,
            _ => 0.0,
        };

        IndicatorSnapshot {
            ema_spread_pct,
            rsi,
            macd_histogram,
            kdj_j,
            ma_distance_pct,
        }
    }

    async fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Option<CandleSeries> {
        match self
            .data
            .candles(symbol, timeframe, self.settings.candle_limit)
            .await
        {
            Ok(series) => series,
            Err(e) => {
                debug!(symbol, %timeframe, error = %e, "Candle fetch failed, skipping");
                None
            }
        }
    }
}

fn direction_word(direction: PositionSide) -> &'static str {
    match direction {
        PositionSide::Long => "Bullish",
        PositionSide::Short => "Bearish",
    }
}
