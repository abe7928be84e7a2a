//! Exchange order gateway trait seam.

use crate::error::ExchangeError;
use crate::types::PositionSide;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request to open (or scale into) a leveraged position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Symbol
    pub symbol: String,
    /// Direction
    pub side: PositionSide,
    /// Base quantity, already rounded to exchange precision
    pub quantity: Decimal,
    /// Leverage multiplier
    pub leverage: u32,
    /// Resting entry price; market entry when absent
    pub limit_price: Option<Decimal>,
    /// Conditional stop-loss to attach
    pub stop_loss: Option<Decimal>,
    /// Conditional take-profit to attach
    pub take_profit: Option<Decimal>,
}

/// Acknowledged entry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenReceipt {
    /// Exchange order ID
    pub order_id: String,
    /// Quantity filled so far (zero for a resting limit entry)
    pub filled_quantity: Decimal,
    /// Average fill price, when filled
    pub avg_price: Option<Decimal>,
}

/// Result of a full or partial close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseReceipt {
    /// Quantity closed
    pub filled_quantity: Decimal,
    /// Average close price
    pub avg_price: Decimal,
    /// Realized PnL in quote units for the closed quantity
    pub realized_pnl: Decimal,
}

/// Fill state of a previously placed order, as the venue reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    /// Quantity filled so far
    pub filled_quantity: Decimal,
    /// Average fill price, once any quantity filled
    pub avg_price: Option<Decimal>,
    /// Whether the order is still live on the venue
    pub live: bool,
}

/// A position as the exchange reports it. Used by reconciliation; the
/// exchange is ground truth for existence, the ledger for intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    /// Symbol
    pub symbol: String,
    /// Direction
    pub side: PositionSide,
    /// Base quantity
    pub quantity: Decimal,
    /// Average entry price
    pub entry_price: Decimal,
    /// Leverage
    pub leverage: u32,
}

/// Price/quantity rounding metadata for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolPrecision {
    /// Price tick size
    pub price_tick: Decimal,
    /// Quantity step size
    pub quantity_step: Decimal,
    /// Minimum order quantity
    pub min_quantity: Decimal,
}

impl SymbolPrecision {
    /// Round a price down to the tick grid.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        round_to_step(price, self.price_tick)
    }

    /// Round a quantity down to the step grid.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        round_to_step(quantity, self.quantity_step)
    }
}

fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).floor() * step
}

/// Places, cancels, and queries orders on the remote exchange. Conditional
/// (stop-loss/take-profit) orders are a separate sub-API because exchanges
/// track them as algo orders with their own IDs.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Submit an entry order.
    async fn open(&self, request: OpenRequest) -> Result<OpenReceipt, ExchangeError>;

    /// Close a position, fully or (with `quantity`) partially, at market.
    async fn close(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Option<Decimal>,
    ) -> Result<CloseReceipt, ExchangeError>;

    /// Cancel a resting order.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError>;

    /// Fill state of a previously placed order.
    async fn order_state(&self, symbol: &str, order_id: &str)
        -> Result<OrderState, ExchangeError>;

    /// List all open positions on the exchange.
    async fn list_open_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError>;

    /// Attach a conditional stop-loss (and optional take-profit) to an
    /// open position. Returns the algo order ID.
    async fn set_stop(
        &self,
        symbol: &str,
        side: PositionSide,
        stop_price: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<String, ExchangeError>;

    /// Replace an existing conditional order. Returns the new algo order ID.
    async fn replace_stop(
        &self,
        symbol: &str,
        algo_id: &str,
        stop_price: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<String, ExchangeError>;

    /// Cancel a conditional order, removing it from the venue.
    async fn cancel_stop(&self, symbol: &str, algo_id: &str) -> Result<(), ExchangeError>;

    /// Precision metadata for a symbol. Implementations cache this and
    /// refresh on a timer; reads are safe concurrently.
    async fn precision(&self, symbol: &str) -> Result<SymbolPrecision, ExchangeError>;

    /// Get the gateway name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_precision_rounding() {
        let precision = SymbolPrecision {
            price_tick: dec!(0.1),
            quantity_step: dec!(0.001),
            min_quantity: dec!(0.001),
        };
        assert_eq!(precision.round_price(dec!(50000.17)), dec!(50000.1));
        assert_eq!(precision.round_quantity(dec!(0.12345)), dec!(0.123));
    }

    #[test]
    fn test_zero_step_passthrough() {
        let precision = SymbolPrecision {
            price_tick: Decimal::ZERO,
            quantity_step: Decimal::ZERO,
            min_quantity: Decimal::ZERO,
        };
        assert_eq!(precision.round_price(dec!(123.456)), dec!(123.456));
    }
}
