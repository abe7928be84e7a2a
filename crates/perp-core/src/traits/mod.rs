//! Trait seams between the engine and its collaborators.

mod exchange;
mod indicator;
mod market_data;
mod repository;

pub use exchange::{
    CloseReceipt, ExchangeGateway, ExchangePosition, OpenReceipt, OpenRequest, OrderState,
    SymbolPrecision,
};
pub use indicator::{Indicator, MultiOutputIndicator, OhlcvIndicator};
pub use market_data::{MarketData, Range24h};
pub use repository::{
    AccountRepository, AuditEntry, AuditRepository, Decision, PositionRepository,
};
