//! Market data for the perpetual-futures engine.

mod csv_source;
mod hub;

pub use csv_source::CsvCandleSource;
pub use hub::MarketHub;

use perp_core::error::DataError;
use perp_core::types::{CandleSeries, Timeframe};
use std::path::Path;

/// Load candles from a CSV file.
pub fn load_csv(
    path: impl AsRef<Path>,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<CandleSeries, DataError> {
    CsvCandleSource::new(path)?.load(symbol, timeframe)
}
