//! REST exchange gateway.
//!
//! Talks to the venue's private REST API. Quantities and prices travel as
//! strings on the wire, the venue's convention for exact decimals. Auth
//! transport is key/secret headers; the signing scheme itself lives outside
//! this crate.

use async_trait::async_trait;
use perp_config::ExchangeSettings;
use perp_core::error::ExchangeError;
use perp_core::traits::{
    CloseReceipt, ExchangeGateway, ExchangePosition, OpenReceipt, OpenRequest, OrderState,
    SymbolPrecision,
};
use perp_core::types::PositionSide;
use reqwest::{header, Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::precision::PrecisionCache;

#[derive(Debug, Serialize)]
struct PlaceOrderRequest {
    symbol: String,
    side: String,
    position_side: String,
    quantity: String,
    leverage: u32,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
    filled_quantity: String,
    avg_price: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClosePositionRequest {
    symbol: String,
    position_side: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloseResponse {
    filled_quantity: String,
    avg_price: String,
    realized_pnl: String,
}

#[derive(Debug, Deserialize)]
struct OrderStateData {
    status: String,
    filled_quantity: String,
    avg_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionData {
    symbol: String,
    position_side: String,
    quantity: String,
    entry_price: String,
    leverage: u32,
}

#[derive(Debug, Serialize)]
struct AlgoOrderRequest {
    symbol: String,
    position_side: String,
    stop_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlgoOrderResponse {
    algo_id: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentData {
    tick_size: String,
    lot_size: String,
    min_size: String,
}

/// REST gateway to the live venue.
pub struct RestExchange {
    client: Client,
    base_url: String,
    precision_cache: PrecisionCache,
}

impl RestExchange {
    /// Build a gateway from settings. The API key and secret are read from
    /// the environment variables the settings name.
    pub fn new(settings: &ExchangeSettings) -> Result<Self, ExchangeError> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            ExchangeError::Configuration(format!("{} not set", settings.api_key_env))
        })?;
        let api_secret = std::env::var(&settings.api_secret_env).map_err(|_| {
            ExchangeError::Configuration(format!("{} not set", settings.api_secret_env))
        })?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            header::HeaderValue::from_str(&api_key)
                .map_err(|e| ExchangeError::Configuration(e.to_string()))?,
        );
        headers.insert(
            "X-API-SECRET",
            header::HeaderValue::from_str(&api_secret)
                .map_err(|e| ExchangeError::Configuration(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExchangeError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            precision_cache: PrecisionCache::new(Duration::from_secs(
                settings.precision_refresh_secs,
            )),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, ExchangeError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let text = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ExchangeError::Authentication(text)
            }
            StatusCode::TOO_MANY_REQUESTS => ExchangeError::RateLimited {
                retry_after_secs: retry_after,
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ExchangeError::OrderRejected(text)
            }
            StatusCode::NOT_FOUND => ExchangeError::Api(format!("404: {}", text)),
            _ => ExchangeError::Api(format!("{}: {}", status, text)),
        })
    }

    fn map_send_error(e: reqwest::Error) -> ExchangeError {
        if e.is_timeout() {
            ExchangeError::Timeout(e.to_string())
        } else {
            ExchangeError::Connection(e.to_string())
        }
    }

    fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, ExchangeError> {
        raw.parse()
            .map_err(|_| ExchangeError::Api(format!("Bad {} in response: {}", field, raw)))
    }

    fn position_side(raw: &str) -> Result<PositionSide, ExchangeError> {
        match raw {
            "long" => Ok(PositionSide::Long),
            "short" => Ok(PositionSide::Short),
            other => Err(ExchangeError::Api(format!("Unknown position side: {}", other))),
        }
    }
}

#[async_trait]
impl ExchangeGateway for RestExchange {
    async fn open(&self, request: OpenRequest) -> Result<OpenReceipt, ExchangeError> {
        let body = PlaceOrderRequest {
            symbol: request.symbol.clone(),
            side: match request.side {
                PositionSide::Long => "buy".to_string(),
                PositionSide::Short => "sell".to_string(),
            },
            position_side: request.side.to_string().to_lowercase(),
            quantity: request.quantity.to_string(),
            leverage: request.leverage,
            order_type: if request.limit_price.is_some() {
                "limit".to_string()
            } else {
                "market".to_string()
            },
            price: request.limit_price.map(|p| p.to_string()),
            stop_loss: request.stop_loss.map(|p| p.to_string()),
            take_profit: request.take_profit.map(|p| p.to_string()),
        };

        let resp = self
            .client
            .post(self.url("/v1/orders"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let data: OrderResponse = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;

        info!(
            symbol = %request.symbol,
            side = ?request.side,
            order_id = %data.order_id,
            "Entry order placed"
        );
        Ok(OpenReceipt {
            order_id: data.order_id,
            filled_quantity: Self::parse_decimal(&data.filled_quantity, "filled_quantity")?,
            avg_price: data
                .avg_price
                .as_deref()
                .map(|p| Self::parse_decimal(p, "avg_price"))
                .transpose()?,
        })
    }

    async fn close(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Option<Decimal>,
    ) -> Result<CloseReceipt, ExchangeError> {
        let body = ClosePositionRequest {
            symbol: symbol.to_string(),
            position_side: side.to_string().to_lowercase(),
            quantity: quantity.map(|q| q.to_string()),
        };

        let resp = self
            .client
            .post(self.url("/v1/positions/close"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let data: CloseResponse = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;

        Ok(CloseReceipt {
            filled_quantity: Self::parse_decimal(&data.filled_quantity, "filled_quantity")?,
            avg_price: Self::parse_decimal(&data.avg_price, "avg_price")?,
            realized_pnl: Self::parse_decimal(&data.realized_pnl, "realized_pnl")?,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let resp = self
            .client
            .delete(self.url(&format!("/v1/orders/{}", order_id)))
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(Self::map_send_error)?;
        self.check(resp).await?;
        debug!(symbol, order_id, "Order cancelled");
        Ok(())
    }

    async fn order_state(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderState, ExchangeError> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/orders/{}", order_id)))
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let data: OrderStateData = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;

        Ok(OrderState {
            filled_quantity: Self::parse_decimal(&data.filled_quantity, "filled_quantity")?,
            avg_price: data
                .avg_price
                .as_deref()
                .map(|p| Self::parse_decimal(p, "avg_price"))
                .transpose()?,
            live: matches!(data.status.as_str(), "live" | "partially_filled"),
        })
    }

    async fn list_open_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let resp = self
            .client
            .get(self.url("/v1/positions"))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let data: Vec<PositionData> = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;

        data.into_iter()
            .map(|p| {
                Ok(ExchangePosition {
                    side: Self::position_side(&p.position_side)?,
                    quantity: Self::parse_decimal(&p.quantity, "quantity")?,
                    entry_price: Self::parse_decimal(&p.entry_price, "entry_price")?,
                    leverage: p.leverage,
                    symbol: p.symbol,
                })
            })
            .collect()
    }

    async fn set_stop(
        &self,
        symbol: &str,
        side: PositionSide,
        stop_price: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<String, ExchangeError> {
        let body = AlgoOrderRequest {
            symbol: symbol.to_string(),
            position_side: side.to_string().to_lowercase(),
            stop_price: stop_price.to_string(),
            take_profit: take_profit.map(|p| p.to_string()),
        };

        let resp = self
            .client
            .post(self.url("/v1/algo-orders"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let data: AlgoOrderResponse = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;
        Ok(data.algo_id)
    }

    async fn replace_stop(
        &self,
        symbol: &str,
        algo_id: &str,
        stop_price: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<String, ExchangeError> {
        let body = AlgoOrderRequest {
            symbol: symbol.to_string(),
            position_side: String::new(),
            stop_price: stop_price.to_string(),
            take_profit: take_profit.map(|p| p.to_string()),
        };

        let resp = self
            .client
            .post(self.url(&format!("/v1/algo-orders/{}/replace", algo_id)))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let data: AlgoOrderResponse = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;
        Ok(data.algo_id)
    }

    async fn cancel_stop(&self, symbol: &str, algo_id: &str) -> Result<(), ExchangeError> {
        let resp = self
            .client
            .delete(self.url(&format!("/v1/algo-orders/{}", algo_id)))
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(Self::map_send_error)?;
        self.check(resp).await?;
        debug!(symbol, algo_id, "Conditional order cancelled");
        Ok(())
    }

    async fn precision(&self, symbol: &str) -> Result<SymbolPrecision, ExchangeError> {
        if let Some(cached) = self.precision_cache.get(symbol).await {
            return Ok(cached);
        }

        let resp = self
            .client
            .get(self.url(&format!("/v1/instruments/{}", symbol)))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        let data: InstrumentData = self
            .check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ExchangeError::Api(e.to_string()))?;

        let precision = SymbolPrecision {
            price_tick: Self::parse_decimal(&data.tick_size, "tick_size")?,
            quantity_step: Self::parse_decimal(&data.lot_size, "lot_size")?,
            min_quantity: Self::parse_decimal(&data.min_size, "min_size")?,
        };
        self.precision_cache.put(symbol, precision).await;
        Ok(precision)
    }

    fn name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_is_config_error() {
        let settings = ExchangeSettings {
            api_key_env: "PERP_TEST_MISSING_KEY".to_string(),
            api_secret_env: "PERP_TEST_MISSING_SECRET".to_string(),
            ..ExchangeSettings::default()
        };
        assert!(matches!(
            RestExchange::new(&settings),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[test]
    fn test_position_side_parse() {
        assert_eq!(
            RestExchange::position_side("long").unwrap(),
            PositionSide::Long
        );
        assert!(RestExchange::position_side("flat").is_err());
    }

    #[test]
    fn test_order_body_shape() {
        let body = PlaceOrderRequest {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: "buy".to_string(),
            position_side: "long".to_string(),
            quantity: "0.01".to_string(),
            leverage: 10,
            order_type: "market".to_string(),
            price: None,
            stop_loss: Some("49000".to_string()),
            take_profit: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"type\":\"market\""));
        assert!(json.contains("\"stop_loss\":\"49000\""));
        assert!(!json.contains("take_profit"));
    }
}
