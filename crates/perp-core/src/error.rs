//! Error types for the trading engine.

use thiserror::Error;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Entry blocked: {reason}")]
    EntryBlocked { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Signal detection errors.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Insufficient candles: need {required}, have {available}")]
    InsufficientCandles { required: usize, available: usize },

    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),

    #[error("Signal error: {0}")]
    Internal(String),
}

/// Exchange gateway errors.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Quantity {quantity} below exchange minimum {min} for {symbol}")]
    BelowMinQuantity {
        symbol: String,
        quantity: rust_decimal::Decimal,
        min: rust_decimal::Decimal,
    },

    #[error("Position not found on exchange: {0}")]
    PositionNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error: {0}")]
    Api(String),
}

impl ExchangeError {
    /// Transient errors are retried on the next cycle; everything else is a
    /// hard rejection of the attempted operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_) | ExchangeError::Timeout(_) | ExchangeError::RateLimited { .. }
        )
    }
}

/// Market data errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("No candles available for the requested range")]
    NoCandles,

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Feed connection error: {0}")]
    Connection(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Data source error: {0}")]
    Internal(String),
}

/// Position ledger errors. Most of these are invariant violations: they are
/// rejected locally before any exchange call is made.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Position not found: {0}")]
    PositionNotFound(uuid::Uuid),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Position {0} is already being written by another task")]
    WriterConflict(uuid::Uuid),

    #[error("Counterpart link already set for position {0}")]
    CounterpartAlreadyLinked(uuid::Uuid),

    #[error("Insufficient available balance: required {required}, available {available}")]
    InsufficientBalance {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Frozen balance underflow: releasing {requested}, frozen {frozen}")]
    FrozenUnderflow {
        requested: rust_decimal::Decimal,
        frozen: rust_decimal::Decimal,
    },

    #[error("Ledger error: {0}")]
    Internal(String),
}

/// Indicator calculation errors.
#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("Insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
