//! Public market-data REST client.
//!
//! Unauthenticated endpoints for tickers and candle history. The poll loop
//! that pushes these into the in-memory hub lives with the caller; this
//! client only fetches and parses.

use perp_config::ExchangeSettings;
use perp_core::error::ExchangeError;
use perp_core::traits::Range24h;
use perp_core::types::{Candle, CandleSeries, Timeframe};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TickerData {
    last: String,
    high_24h: String,
    low_24h: String,
}

/// Candle row on the wire: [open_time_ms, open, high, low, close, volume].
#[derive(Debug, Deserialize)]
struct CandleRow(i64, String, String, String, String, String);

/// Last trade and the 24h window it sits in.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub last: Decimal,
    pub range_24h: Range24h,
}

/// Client for the venue's public market-data endpoints.
pub struct MarketFeed {
    client: Client,
    base_url: String,
}

impl MarketFeed {
    pub fn new(settings: &ExchangeSettings) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExchangeError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, ExchangeError> {
        raw.parse()
            .map_err(|_| ExchangeError::Api(format!("Bad {} in response: {}", field, raw)))
    }

    fn parse_f64(raw: &str, field: &str) -> Result<f64, ExchangeError> {
        raw.parse()
            .map_err(|_| ExchangeError::Api(format!("Bad {} in response: {}", field, raw)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExchangeError::Timeout(e.to_string())
                } else {
                    ExchangeError::Connection(e.to_string())
                }
            })?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Api(format!("{}: {}", status, text)));
        }
        resp.json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))
    }

    /// Last trade and 24h high/low for a symbol.
    pub async fn ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let data: TickerData = self
            .get_json("/v1/market/ticker", &[("symbol", symbol.to_string())])
            .await?;
        Ok(Ticker {
            last: Self::parse_decimal(&data.last, "last")?,
            range_24h: Range24h {
                high: Self::parse_decimal(&data.high_24h, "high_24h")?,
                low: Self::parse_decimal(&data.low_24h, "low_24h")?,
            },
        })
    }

    /// Most recent candles for a symbol, oldest first.
    pub async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, ExchangeError> {
        let rows: Vec<CandleRow> = self
            .get_json(
                "/v1/market/candles",
                &[
                    ("symbol", symbol.to_string()),
                    ("timeframe", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let mut series = CandleSeries::with_capacity(symbol, timeframe, limit);
        for row in rows {
            series.push(Candle::new(
                row.0,
                Self::parse_f64(&row.1, "open")?,
                Self::parse_f64(&row.2, "high")?,
                Self::parse_f64(&row.3, "low")?,
                Self::parse_f64(&row.4, "close")?,
                Self::parse_f64(&row.5, "volume")?,
            ));
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_candle_row_parse() {
        let raw = r#"[[1700000000000,"100.0","101.5","99.5","101.0","1234.5"]]"#;
        let rows: Vec<CandleRow> = serde_json::from_str(raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 1700000000000);
        assert_eq!(rows[0].4, "101.0");
    }

    #[test]
    fn test_ticker_parse() {
        let raw = r#"{"last":"50000.5","high_24h":"51000","low_24h":"49000"}"#;
        let data: TickerData = serde_json::from_str(raw).unwrap();
        assert_eq!(
            MarketFeed::parse_decimal(&data.last, "last").unwrap(),
            dec!(50000.5)
        );
    }

    #[test]
    fn test_bad_decimal_is_api_error() {
        assert!(matches!(
            MarketFeed::parse_decimal("not-a-number", "last"),
            Err(ExchangeError::Api(_))
        ));
    }
}
