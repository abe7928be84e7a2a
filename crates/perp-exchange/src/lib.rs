//! Exchange order gateways.
//!
//! Two implementations of the gateway seam: a REST client for the live
//! venue and a paper venue that fills against live prices. The execution
//! engine holds one of each when mirroring is enabled.

mod market;
mod paper;
mod precision;
mod rest;

pub use market::{MarketFeed, Ticker};
pub use paper::PaperExchange;
pub use precision::PrecisionCache;
pub use rest::RestExchange;
