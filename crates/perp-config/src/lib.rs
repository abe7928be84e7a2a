//! Configuration management.

mod settings;

pub use settings::{
    AppConfig, AppSettings, DetectorSettings, ExchangeSettings, ExitSettings, FilterSettings,
    GateSettings, LoggingConfig, RegimeSettings, StrategySettings,
};

use config::{Config, ConfigError, Environment, File};
use std::path::Path;

/// Load configuration from file and environment.
///
/// Environment variables prefixed with `PERP` override file values, e.g.
/// `PERP__STRATEGY__LEVERAGE=5`.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix("PERP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}

/// Load configuration without requiring a file, defaults plus environment.
pub fn load_defaults() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(
            Environment::with_prefix("PERP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let overlay: AppConfig = config.try_deserialize()?;
    Ok(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_gets_defaults() {
        let raw = r#"
[app]
name = "perp-test"
environment = "test"

[strategy]
symbols = ["BTC-USDT-SWAP"]
scan_interval_secs = 15
monitor_interval_secs = 5
health_check_interval_secs = 60
leverage = 5
margin_per_position = "50"
"#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.app.name, "perp-test");
        assert_eq!(config.strategy.leverage, 5);
        assert_eq!(config.strategy.symbols, vec!["BTC-USDT-SWAP"]);
        // Unspecified sections fall back to defaults
        assert_eq!(config.strategy.gates.max_positions_per_side, 3);
        assert!(config.strategy.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.strategy.detector.fast_period, 9);
        assert_eq!(config.strategy.detector.slow_period, 26);
        assert!(config.exchange.mirror_to_paper);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_config(Path::new("/nonexistent/config.toml")).is_err());
    }
}
