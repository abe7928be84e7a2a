//! Validate configuration command.

use anyhow::Result;
use perp_config::load_config;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    };
    if let Err(e) = config.strategy.validate() {
        println!("Strategy error: {}", e);
        anyhow::bail!(e);
    }

    println!("Configuration is valid!");
    println!();
    println!("App: {}", config.app.name);
    println!("Environment: {}", config.app.environment);
    println!("Exchange: {}", config.exchange.base_url);
    println!("Mirror to paper: {}", config.exchange.mirror_to_paper);
    println!("Symbols: {}", config.strategy.symbols.join(", "));
    println!("Leverage: {}x", config.strategy.leverage);
    println!("Margin per position: {}", config.strategy.margin_per_position);
    println!(
        "Stop loss / take profit: {}% / {}%",
        config.strategy.exits.stop_loss_pct, config.strategy.exits.max_take_profit_pct
    );
    println!("Regime basket: {}", config.strategy.regime.basket.join(", "));
    Ok(())
}
