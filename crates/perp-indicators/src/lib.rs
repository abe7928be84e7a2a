//! Technical indicators for the perpetual-futures engine.
//!
//! Pure batch calculators over candle columns:
//! - Moving averages (SMA, EMA) and the fast/slow EMA spread
//! - Momentum oscillators (RSI, MACD, KDJ)
//!
//! All outputs are tail-aligned with their input so the last element
//! always corresponds to the newest candle supplied.

pub mod momentum;
pub mod moving_average;
pub mod trend;

pub use momentum::{Kdj, KdjOutput, Macd, MacdOutput, Rsi};
pub use moving_average::{Ema, Sma};
pub use trend::{EmaSpread, SpreadPoint};
