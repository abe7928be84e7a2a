//! Configuration structures.
//!
//! Every threshold the engine consults lives here with an explicit default.
//! The engine takes the strategy section as an immutable snapshot at the
//! start of each evaluation cycle; nothing reads configuration ambiently.

use perp_core::types::Timeframe;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub strategy: StrategySettings,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "perp-engine".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Exchange connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    /// Mirror every live order into the paper ledger when true
    pub mirror_to_paper: bool,
    /// Starting capital for the paper ledger
    pub paper_capital: Decimal,
    /// Symbol precision metadata refresh cadence
    pub precision_refresh_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.example".to_string(),
            api_key_env: "PERP_API_KEY".to_string(),
            api_secret_env: "PERP_API_SECRET".to_string(),
            mirror_to_paper: true,
            paper_capital: dec!(10000),
            precision_refresh_secs: 300,
        }
    }
}

/// Immutable per-cycle strategy parameter bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Symbols scanned for entries
    pub symbols: Vec<String>,
    /// Scan loop cadence, seconds
    pub scan_interval_secs: u64,
    /// Per-position monitoring cadence, seconds
    pub monitor_interval_secs: u64,
    /// Supervisor health-check cadence, seconds
    pub health_check_interval_secs: u64,
    /// Leverage applied to every entry
    pub leverage: u32,
    /// Margin committed per position, quote units
    pub margin_per_position: Decimal,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub filters: FilterSettings,
    #[serde(default)]
    pub exits: ExitSettings,
    #[serde(default)]
    pub gates: GateSettings,
    #[serde(default)]
    pub regime: RegimeSettings,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC-USDT-SWAP".to_string(), "ETH-USDT-SWAP".to_string()],
            scan_interval_secs: 30,
            monitor_interval_secs: 10,
            health_check_interval_secs: 60,
            leverage: 10,
            margin_per_position: dec!(100),
            detector: DetectorSettings::default(),
            filters: FilterSettings::default(),
            exits: ExitSettings::default(),
            gates: GateSettings::default(),
            regime: RegimeSettings::default(),
        }
    }
}

impl StrategySettings {
    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbols.is_empty() {
            return Err("At least one symbol required".into());
        }
        if self.leverage == 0 {
            return Err("Leverage must be at least 1".into());
        }
        if self.margin_per_position <= Decimal::ZERO {
            return Err("Margin per position must be positive".into());
        }
        self.detector.validate()?;
        self.exits.validate()?;
        Ok(())
    }
}

/// Signal detector parameters (§ detector priority order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Fast MA period for the crossover pair
    pub fast_period: usize,
    /// Slow MA period for the crossover pair
    pub slow_period: usize,
    /// Medium MA period for the EMA+MA consistency check
    pub mid_period: usize,
    /// Minimum crossover strength, percent
    pub min_signal_strength_pct: f64,
    /// Stricter threshold for limit-entry signals, percent
    pub limit_entry_min_strength_pct: f64,
    /// Resting entry offset from mark price, percent; None disables
    /// limit-entry detection entirely
    pub limit_entry_offset_pct: Option<f64>,
    /// Candles the fast-timeframe spread must expand across
    pub expansion_candles: usize,
    /// Candles in the oscillation-reversal run
    pub oscillation_candles: usize,
    /// Combined high-low band for the oscillation run, percent
    pub oscillation_band_pct: f64,
    /// Fast timeframe (counter-signal checks, spread expansion)
    pub fast_timeframe: Timeframe,
    /// Mid timeframe (crossover, oscillation)
    pub mid_timeframe: Timeframe,
    /// Slow timeframe (sustained trend)
    pub slow_timeframe: Timeframe,
    /// Candles fetched per evaluation
    pub candle_limit: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            fast_period: 9,
            slow_period: 26,
            mid_period: 20,
            min_signal_strength_pct: 0.15,
            limit_entry_min_strength_pct: 0.25,
            limit_entry_offset_pct: None,
            expansion_candles: 4,
            oscillation_candles: 4,
            oscillation_band_pct: 0.5,
            fast_timeframe: Timeframe::Minute5,
            mid_timeframe: Timeframe::Minute15,
            slow_timeframe: Timeframe::Hour1,
            candle_limit: 100,
        }
    }
}

impl DetectorSettings {
    fn validate(&self) -> Result<(), String> {
        if self.fast_period >= self.slow_period {
            return Err("Fast period must be less than slow period".into());
        }
        if self.candle_limit <= self.slow_period {
            return Err("Candle limit must exceed the slow period".into());
        }
        // The volume split needs a run long enough to halve
        if self.oscillation_candles < 2 {
            return Err("Oscillation run must span at least 2 candles".into());
        }
        Ok(())
    }
}

/// Admission filter toggles and bounds. Each filter is independently
/// switchable; a disabled filter always passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    /// RSI filter enabled
    pub rsi_enabled: bool,
    /// RSI period
    pub rsi_period: usize,
    /// Reject longs with RSI above this
    pub rsi_long_max: f64,
    /// Reject shorts with RSI below this
    pub rsi_short_min: f64,
    /// MACD-histogram sign check enabled
    pub macd_enabled: bool,
    /// KDJ overbought/oversold check enabled
    pub kdj_enabled: bool,
    /// KDJ J overbought bound (rejects longs)
    pub kdj_overbought: f64,
    /// KDJ J oversold bound (rejects shorts)
    pub kdj_oversold: f64,
    /// Signals at or above this strength bypass the KDJ check
    pub kdj_override_strength_pct: f64,
    /// Reject entries further than this from the short EMA, percent
    pub ma_distance_cap_pct: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            rsi_enabled: true,
            rsi_period: 14,
            rsi_long_max: 70.0,
            rsi_short_min: 30.0,
            macd_enabled: false,
            kdj_enabled: false,
            kdj_overbought: 80.0,
            kdj_oversold: 20.0,
            kdj_override_strength_pct: 1.0,
            ma_distance_cap_pct: 2.0,
        }
    }
}

/// Exit state machine thresholds (§ exit priority order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSettings {
    /// Hard stop, percent of margin
    pub stop_loss_pct: Decimal,
    /// Take-profit cap, percent of margin
    pub max_take_profit_pct: Decimal,
    /// Minimum strength for the counter-signal stop, percent
    pub counter_signal_min_strength_pct: f64,
    /// Dwell time before trend-weakening is considered, seconds
    pub trend_weaken_min_dwell_secs: u64,
    /// Minimum profit before trend-weakening is considered, percent
    pub trend_weaken_min_profit_pct: Decimal,
    /// Unrealized PnL percent that activates the trailing stop
    pub trailing_activation_pct: Decimal,
    /// Trailing distance from the best price, percent of price
    pub trailing_distance_pct: Decimal,
    /// Fraction of the position closed at first trailing ratchet; None
    /// disables partial takes
    pub partial_take_fraction: Option<Decimal>,
    /// Scale stop distances by the symbol's volatility profile
    pub volatility_override: bool,
}

impl Default for ExitSettings {
    fn default() -> Self {
        Self {
            stop_loss_pct: dec!(2.0),
            max_take_profit_pct: dec!(10.0),
            counter_signal_min_strength_pct: 0.3,
            trend_weaken_min_dwell_secs: 1800,
            trend_weaken_min_profit_pct: dec!(1.0),
            trailing_activation_pct: dec!(1.5),
            trailing_distance_pct: dec!(0.5),
            partial_take_fraction: None,
            volatility_override: false,
        }
    }
}

impl ExitSettings {
    fn validate(&self) -> Result<(), String> {
        if self.stop_loss_pct <= Decimal::ZERO {
            return Err("Stop loss percent must be positive".into());
        }
        if self.trailing_distance_pct >= self.trailing_activation_pct {
            return Err("Trailing distance must be below the activation threshold".into());
        }
        if let Some(fraction) = self.partial_take_fraction {
            if fraction <= Decimal::ZERO || fraction >= Decimal::ONE {
                return Err("Partial take fraction must be in (0, 1)".into());
            }
        }
        Ok(())
    }
}

/// Pre-open gates (§ opening path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    /// Cap on concurrent positions per (symbol, direction)
    pub max_positions_per_side: usize,
    /// No open/close on a (symbol, direction) within this window, seconds
    pub cooldown_secs: u64,
    /// Reject entries in the extreme fraction of the 24h range (0.25 =
    /// top/bottom quarter)
    pub chase_range_fraction: f64,
    /// Planned-close deadline after entry, hours
    pub position_timeout_hours: u64,
    /// Resting limit-entry TTL, seconds
    pub limit_entry_ttl_secs: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            max_positions_per_side: 3,
            cooldown_secs: 900,
            chase_range_fraction: 0.25,
            position_timeout_hours: 24,
            limit_entry_ttl_secs: 1800,
        }
    }
}

/// Market regime gate parameters (§ reference basket).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSettings {
    /// Reference basket symbols
    pub basket: Vec<String>,
    /// Timeframes blended per basket member
    pub timeframes: Vec<Timeframe>,
    /// Candles inspected per timeframe
    pub lookback_candles: usize,
    /// Basket strength needed to veto an opposing signal, percent
    pub veto_strength_pct: f64,
    /// Margin multiplier applied when the basket agrees
    pub boost_factor: Decimal,
    /// Retrace from the local extreme that marks a reversal, percent
    pub reversal_retrace_pct: f64,
    /// Max candles between basket members' extremes
    pub reversal_sync_candles: usize,
    /// Members that must retrace together to call a reversal
    pub reversal_min_members: usize,
    /// Reversal scan lookback, hours
    pub reversal_lookback_hours: u64,
    /// Entry lock after a detected reversal, seconds
    pub emergency_lock_secs: u64,
}

impl Default for RegimeSettings {
    fn default() -> Self {
        Self {
            basket: vec![
                "BTC-USDT-SWAP".to_string(),
                "ETH-USDT-SWAP".to_string(),
                "SOL-USDT-SWAP".to_string(),
                "BNB-USDT-SWAP".to_string(),
            ],
            timeframes: vec![Timeframe::Minute5, Timeframe::Minute15, Timeframe::Hour1],
            lookback_candles: 12,
            veto_strength_pct: 0.4,
            boost_factor: dec!(1.25),
            reversal_retrace_pct: 5.0,
            reversal_sync_candles: 2,
            reversal_min_members: 3,
            reversal_lookback_hours: 4,
            emergency_lock_secs: 7200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(StrategySettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ma_pair_rejected() {
        let mut settings = StrategySettings::default();
        settings.detector.fast_period = 30;
        settings.detector.slow_period = 26;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_single_candle_oscillation_run_rejected() {
        let mut settings = StrategySettings::default();
        settings.detector.oscillation_candles = 1;
        assert!(settings.validate().is_err());
        settings.detector.oscillation_candles = 2;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_trailing_distance_must_undercut_activation() {
        let mut settings = StrategySettings::default();
        settings.exits.trailing_distance_pct = dec!(2.0);
        settings.exits.trailing_activation_pct = dec!(1.5);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_take_fraction_bounds() {
        let mut settings = StrategySettings::default();
        settings.exits.partial_take_fraction = Some(dec!(1.5));
        assert!(settings.validate().is_err());
        settings.exits.partial_take_fraction = Some(dec!(0.5));
        assert!(settings.validate().is_ok());
    }
}
