//! Core types and traits for the perpetual-futures trading engine.
//!
//! This crate defines the shared vocabulary of the workspace: candles and
//! timeframes, signals, the position lifecycle, account balances, and the
//! trait seams (market data, exchange gateway, repositories) that the
//! engine crates are wired through.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    DataError, EngineError, EngineResult, ExchangeError, IndicatorError, LedgerError, SignalError,
};
