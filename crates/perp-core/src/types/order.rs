//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PositionSide;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side that opens a position in the given direction.
    pub fn opening(direction: PositionSide) -> Self {
        match direction {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Side that closes a position in the given direction.
    pub fn closing(direction: PositionSide) -> Self {
        Side::opening(direction).opposite()
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Execution style of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Execute immediately at best available price
    Market,
    /// Rest at the given price until filled or expired
    Limit,
}

/// What the order does to the position it is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPurpose {
    /// Entry order
    Open,
    /// Full or partial close
    Close,
    /// Conditional stop-loss order held on the exchange
    StopLoss,
    /// Conditional take-profit order held on the exchange
    TakeProfit,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted, not yet filled
    Pending,
    /// Completely filled
    Filled,
    /// Cancelled before fill
    Cancelled,
    /// Resting order expired unfilled
    Expired,
}

impl OrderStatus {
    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

/// An order placed through the gateway, linked to the position it serves.
/// A position accumulates several of these over its life (entry,
/// partial closes, conditional stops).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Internal order ID
    pub id: Uuid,
    /// Exchange-assigned order ID, once acknowledged
    pub exchange_order_id: Option<String>,
    /// Position this order belongs to
    pub position_id: Option<Uuid>,
    /// Symbol
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Market or limit
    pub kind: OrderKind,
    /// Open / close / conditional
    pub purpose: OrderPurpose,
    /// Requested quantity
    pub quantity: Decimal,
    /// Limit price for resting orders
    pub price: Option<Decimal>,
    /// Current status
    pub status: OrderStatus,
    /// Quantity filled so far
    pub filled_quantity: Decimal,
    /// Average fill price
    pub avg_fill_price: Option<Decimal>,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// Resting-order expiry; limit entries are cancelled past this
    pub expires_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a market order.
    pub fn market(
        symbol: impl Into<String>,
        side: Side,
        purpose: OrderPurpose,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange_order_id: None,
            position_id: None,
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            purpose,
            quantity,
            price: None,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Create a resting limit order.
    pub fn limit(
        symbol: impl Into<String>,
        side: Side,
        purpose: OrderPurpose,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Limit,
            price: Some(price),
            ..Self::market(symbol, side, purpose, quantity)
        }
    }

    /// Link the order to a position.
    pub fn for_position(mut self, position_id: Uuid) -> Self {
        self.position_id = Some(position_id);
        self
    }

    /// Set a resting-order expiry.
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Record a complete fill.
    pub fn mark_filled(&mut self, quantity: Decimal, avg_price: Decimal) {
        self.filled_quantity = quantity;
        self.avg_fill_price = Some(avg_price);
        self.status = OrderStatus::Filled;
    }

    /// Whether the resting order has outlived its TTL at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at.is_some_and(|at| now >= at)
    }
}
