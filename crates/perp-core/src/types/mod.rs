//! Core data types for the trading engine.

mod account;
mod candle;
mod order;
mod position;
mod signal;
mod timeframe;

pub use account::AccountBalance;
pub use candle::{Candle, CandleSeries};
pub use order::{Order, OrderKind, OrderPurpose, OrderStatus, Side};
pub use position::{ExitReason, Position, PositionSide, PositionStatus, TrailingState};
pub use signal::{FilterReject, IndicatorSnapshot, Signal, SignalKind};
pub use timeframe::Timeframe;
