//! Entry sizing and risk prices.

use perp_core::traits::SymbolPrecision;
use perp_core::types::PositionSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Volatility profile classified from the 24h range width. Wider markets
/// get wider stops so ordinary noise does not shake the position out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityProfile {
    Quiet,
    Normal,
    Wild,
}

impl VolatilityProfile {
    /// Classify from the 24h range width in percent.
    pub fn classify(range_width_pct: f64) -> Self {
        if range_width_pct < 2.0 {
            VolatilityProfile::Quiet
        } else if range_width_pct > 8.0 {
            VolatilityProfile::Wild
        } else {
            VolatilityProfile::Normal
        }
    }

    /// Multiplier applied to stop/take-profit distances.
    pub fn stop_scale(&self) -> Decimal {
        match self {
            VolatilityProfile::Quiet => dec!(0.75),
            VolatilityProfile::Normal => Decimal::ONE,
            VolatilityProfile::Wild => dec!(1.5),
        }
    }
}

/// Base quantity for the given margin and leverage at `price`, rounded down
/// to the exchange quantity step.
pub fn entry_quantity(
    margin: Decimal,
    leverage: u32,
    price: Decimal,
    precision: &SymbolPrecision,
) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = margin * Decimal::from(leverage) / price;
    precision.round_quantity(raw)
}

/// Stop-loss and take-profit prices for an entry.
///
/// The configured percentages are on margin, so the price distance is the
/// percentage divided by leverage. `scale` widens or narrows both distances
/// per the volatility profile.
pub fn risk_prices(
    side: PositionSide,
    entry_price: Decimal,
    leverage: u32,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    scale: Decimal,
    precision: &SymbolPrecision,
) -> (Decimal, Decimal) {
    let lev = Decimal::from(leverage.max(1));
    let stop_move = stop_loss_pct * scale / lev / dec!(100);
    let take_move = take_profit_pct * scale / lev / dec!(100);
    let (stop, take) = match side {
        PositionSide::Long => (
            entry_price * (Decimal::ONE - stop_move),
            entry_price * (Decimal::ONE + take_move),
        ),
        PositionSide::Short => (
            entry_price * (Decimal::ONE + stop_move),
            entry_price * (Decimal::ONE - take_move),
        ),
    };
    (precision.round_price(stop), precision.round_price(take))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precision() -> SymbolPrecision {
        SymbolPrecision {
            price_tick: dec!(0.1),
            quantity_step: dec!(0.001),
            min_quantity: dec!(0.001),
        }
    }

    #[test]
    fn test_quantity_from_margin_and_leverage() {
        // 100 margin at 10x = 1000 notional; 0.02 BTC at 50k
        let quantity = entry_quantity(dec!(100), 10, dec!(50000), &precision());
        assert_eq!(quantity, dec!(0.02));
    }

    #[test]
    fn test_quantity_rounds_down_to_step() {
        let quantity = entry_quantity(dec!(100), 10, dec!(48000), &precision());
        // 1000 / 48000 = 0.02083...
        assert_eq!(quantity, dec!(0.020));
    }

    #[test]
    fn test_risk_prices_divide_by_leverage() {
        // 2% stop on margin at 10x leverage = 0.2% price distance
        let (stop, take) = risk_prices(
            PositionSide::Long,
            dec!(50000),
            10,
            dec!(2.0),
            dec!(10.0),
            Decimal::ONE,
            &precision(),
        );
        assert_eq!(stop, dec!(49900));
        assert_eq!(take, dec!(50500));
    }

    #[test]
    fn test_short_risk_prices_mirror() {
        let (stop, take) = risk_prices(
            PositionSide::Short,
            dec!(50000),
            10,
            dec!(2.0),
            dec!(10.0),
            Decimal::ONE,
            &precision(),
        );
        assert_eq!(stop, dec!(50100));
        assert_eq!(take, dec!(49500));
    }

    #[test]
    fn test_volatility_scale_widens_stops() {
        let profile = VolatilityProfile::classify(12.0);
        assert_eq!(profile, VolatilityProfile::Wild);
        let (stop, _) = risk_prices(
            PositionSide::Long,
            dec!(50000),
            10,
            dec!(2.0),
            dec!(10.0),
            profile.stop_scale(),
            &precision(),
        );
        // 0.2% * 1.5 = 0.3% distance
        assert_eq!(stop, dec!(49850));

        assert_eq!(VolatilityProfile::classify(1.0), VolatilityProfile::Quiet);
        assert_eq!(VolatilityProfile::classify(5.0), VolatilityProfile::Normal);
    }
}
