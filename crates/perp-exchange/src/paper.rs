//! Paper exchange gateway.
//!
//! Simulates a perpetual-futures venue against live market data: market
//! orders fill at the current price plus slippage, limit entries rest until
//! the market crosses them or they are cancelled, and conditional stops are
//! tracked as algo orders. Used for the paper ledger side of live/paper
//! mirroring and for dry runs.

use async_trait::async_trait;
use perp_core::error::ExchangeError;
use perp_core::traits::{
    CloseReceipt, ExchangeGateway, ExchangePosition, MarketData, OpenReceipt, OpenRequest,
    OrderState, SymbolPrecision,
};
use perp_core::types::PositionSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct SimPosition {
    symbol: String,
    side: PositionSide,
    quantity: Decimal,
    entry_price: Decimal,
    leverage: u32,
}

/// A resting limit entry, held until the market crosses it or it is
/// cancelled.
#[derive(Debug, Clone)]
struct RestingOrder {
    symbol: String,
    request: OpenRequest,
    /// Fill price once the market crossed the limit
    filled_at: Option<Decimal>,
}

/// A conditional order as the venue would track it.
#[derive(Debug, Clone)]
struct AlgoOrder {
    #[allow(dead_code)]
    symbol: String,
    side: PositionSide,
    #[allow(dead_code)]
    stop_price: Decimal,
    #[allow(dead_code)]
    take_profit: Option<Decimal>,
}

fn position_key(symbol: &str, side: PositionSide) -> String {
    format!("{}:{:?}", symbol, side)
}

/// Simulated exchange backed by a live price source.
pub struct PaperExchange {
    data: Arc<dyn MarketData>,
    positions: Mutex<HashMap<String, SimPosition>>,
    resting: Mutex<HashMap<String, RestingOrder>>,
    algos: Mutex<HashMap<String, AlgoOrder>>,
    precision: SymbolPrecision,
    slippage_pct: Decimal,
}

impl PaperExchange {
    /// Create a paper exchange filling at prices from `data`.
    pub fn new(data: Arc<dyn MarketData>) -> Self {
        Self {
            data,
            positions: Mutex::new(HashMap::new()),
            resting: Mutex::new(HashMap::new()),
            algos: Mutex::new(HashMap::new()),
            precision: SymbolPrecision {
                price_tick: dec!(0.1),
                quantity_step: dec!(0.001),
                min_quantity: dec!(0.001),
            },
            slippage_pct: dec!(0.05),
        }
    }

    /// Set the simulated slippage percentage.
    pub fn with_slippage(mut self, slippage_pct: Decimal) -> Self {
        self.slippage_pct = slippage_pct;
        self
    }

    /// Override the default precision grid.
    pub fn with_precision(mut self, precision: SymbolPrecision) -> Self {
        self.precision = precision;
        self
    }

    async fn market_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        match self.data.current_price(symbol).await {
            Ok(Some(price)) => Ok(price),
            Ok(None) => Err(ExchangeError::Connection(format!(
                "No market price for {}",
                symbol
            ))),
            Err(e) => Err(ExchangeError::Connection(e.to_string())),
        }
    }

    /// Number of conditional orders currently held by the venue.
    pub fn open_algo_orders(&self) -> usize {
        self.algos.lock().unwrap().len()
    }

    /// Book a fill into the venue's position table, scaling in at the
    /// weighted average entry when a same-side position exists.
    fn book_fill(&self, request: &OpenRequest, fill_price: Decimal) {
        let key = position_key(&request.symbol, request.side);
        let mut positions = self.positions.lock().unwrap();
        match positions.get_mut(&key) {
            Some(existing) => {
                let total = existing.quantity + request.quantity;
                existing.entry_price = (existing.entry_price * existing.quantity
                    + fill_price * request.quantity)
                    / total;
                existing.quantity = total;
            }
            None => {
                positions.insert(
                    key,
                    SimPosition {
                        symbol: request.symbol.clone(),
                        side: request.side,
                        quantity: request.quantity,
                        entry_price: fill_price,
                        leverage: request.leverage,
                    },
                );
            }
        }
        debug!(
            symbol = %request.symbol,
            side = ?request.side,
            quantity = %request.quantity,
            %fill_price,
            "Paper fill"
        );
    }

    /// Fill any resting limit order the market has crossed. A buy fills
    /// when the price trades at or under the limit, a sell at or over it;
    /// limit fills execute at the limit price without slippage.
    async fn fill_crossed_resting(&self) {
        let pending: Vec<(String, String)> = {
            let resting = self.resting.lock().unwrap();
            resting
                .iter()
                .filter(|(_, o)| o.filled_at.is_none())
                .map(|(id, o)| (id.clone(), o.symbol.clone()))
                .collect()
        };
        for (order_id, symbol) in pending {
            let Ok(price) = self.market_price(&symbol).await else {
                continue;
            };
            let request = {
                let mut resting = self.resting.lock().unwrap();
                let Some(order) = resting.get_mut(&order_id) else {
                    continue;
                };
                let Some(limit) = order.request.limit_price else {
                    continue;
                };
                let crossed = match order.request.side {
                    PositionSide::Long => price <= limit,
                    PositionSide::Short => price >= limit,
                };
                if !crossed {
                    continue;
                }
                order.filled_at = Some(limit);
                order.request.clone()
            };
            let limit = request.limit_price.unwrap_or(price);
            self.book_fill(&request, limit);
        }
    }

    /// Fill price with slippage applied against the taker.
    fn slip(&self, price: Decimal, side: PositionSide, opening: bool) -> Decimal {
        let adverse = match (side, opening) {
            // Opening a long or closing a short buys; pay up
            (PositionSide::Long, true) | (PositionSide::Short, false) => true,
            _ => false,
        };
        if adverse {
            price * (dec!(1) + self.slippage_pct / dec!(100))
        } else {
            price * (dec!(1) - self.slippage_pct / dec!(100))
        }
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    async fn open(&self, request: OpenRequest) -> Result<OpenReceipt, ExchangeError> {
        if request.quantity < self.precision.min_quantity {
            return Err(ExchangeError::BelowMinQuantity {
                symbol: request.symbol.clone(),
                quantity: request.quantity,
                min: self.precision.min_quantity,
            });
        }

        let order_id = Uuid::new_v4().to_string();

        if request.limit_price.is_some() {
            // Resting entry; no fill until the market crosses it
            self.resting.lock().unwrap().insert(
                order_id.clone(),
                RestingOrder {
                    symbol: request.symbol.clone(),
                    request,
                    filled_at: None,
                },
            );
            return Ok(OpenReceipt {
                order_id,
                filled_quantity: Decimal::ZERO,
                avg_price: None,
            });
        }

        let price = self.market_price(&request.symbol).await?;
        let fill_price = self
            .precision
            .round_price(self.slip(price, request.side, true));
        self.book_fill(&request, fill_price);

        Ok(OpenReceipt {
            order_id,
            filled_quantity: request.quantity,
            avg_price: Some(fill_price),
        })
    }

    async fn close(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Option<Decimal>,
    ) -> Result<CloseReceipt, ExchangeError> {
        let price = self.market_price(symbol).await?;
        let fill_price = self.precision.round_price(self.slip(price, side, false));

        let key = position_key(symbol, side);
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(&key)
            .ok_or_else(|| ExchangeError::PositionNotFound(symbol.to_string()))?;

        let close_qty = match quantity {
            Some(q) => q.min(position.quantity),
            None => position.quantity,
        };
        let realized_pnl =
            (fill_price - position.entry_price) * close_qty * position.side.sign();

        position.quantity -= close_qty;
        if position.quantity.is_zero() {
            positions.remove(&key);
        }

        Ok(CloseReceipt {
            filled_quantity: close_qty,
            avg_price: fill_price,
            realized_pnl,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let mut resting = self.resting.lock().unwrap();
        match resting.get(order_id) {
            Some(order) if order.symbol != symbol => {
                Err(ExchangeError::OrderNotFound(order_id.to_string()))
            }
            Some(order) if order.filled_at.is_some() => Err(ExchangeError::OrderRejected(
                format!("{} already filled", order_id),
            )),
            Some(_) => {
                resting.remove(order_id);
                Ok(())
            }
            None => Err(ExchangeError::OrderNotFound(order_id.to_string())),
        }
    }

    async fn order_state(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderState, ExchangeError> {
        self.fill_crossed_resting().await;
        let resting = self.resting.lock().unwrap();
        let order = resting
            .get(order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;
        Ok(match order.filled_at {
            Some(price) => OrderState {
                filled_quantity: order.request.quantity,
                avg_price: Some(price),
                live: false,
            },
            None => OrderState {
                filled_quantity: Decimal::ZERO,
                avg_price: None,
                live: true,
            },
        })
    }

    async fn list_open_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        self.fill_crossed_resting().await;
        let positions = self.positions.lock().unwrap();
        Ok(positions
            .values()
            .map(|p| ExchangePosition {
                symbol: p.symbol.clone(),
                side: p.side,
                quantity: p.quantity,
                entry_price: p.entry_price,
                leverage: p.leverage,
            })
            .collect())
    }

    async fn set_stop(
        &self,
        symbol: &str,
        side: PositionSide,
        stop_price: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<String, ExchangeError> {
        let algo_id = Uuid::new_v4().to_string();
        self.algos.lock().unwrap().insert(
            algo_id.clone(),
            AlgoOrder {
                symbol: symbol.to_string(),
                side,
                stop_price,
                take_profit,
            },
        );
        Ok(algo_id)
    }

    async fn replace_stop(
        &self,
        symbol: &str,
        algo_id: &str,
        stop_price: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<String, ExchangeError> {
        let side = {
            let mut algos = self.algos.lock().unwrap();
            let old = algos
                .remove(algo_id)
                .ok_or_else(|| ExchangeError::OrderNotFound(algo_id.to_string()))?;
            old.side
        };
        self.set_stop(symbol, side, stop_price, take_profit).await
    }

    async fn cancel_stop(&self, _symbol: &str, algo_id: &str) -> Result<(), ExchangeError> {
        self.algos
            .lock()
            .unwrap()
            .remove(algo_id)
            .map(|_| ())
            .ok_or_else(|| ExchangeError::OrderNotFound(algo_id.to_string()))
    }

    async fn precision(&self, _symbol: &str) -> Result<SymbolPrecision, ExchangeError> {
        Ok(self.precision)
    }

    fn name(&self) -> &str {
        "paper"
    }
}
