//! Thin REST adapter for the exchange.
//!
//! Implements the consumed [`MarketClient`] boundary against a
//! Kalshi-style HTTP API: market facts, orderbook-derived mid prices,
//! limit order placement and position lookup. Request signing is out of
//! scope; authentication is a bearer key from `EXCHANGE_API_KEY`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oddsmith_models::config::ExchangeConfig;
use oddsmith_models::market::{MarketFacts, OrderRequest, Side};
use oddsmith_trading::{ExchangePosition, MarketClient, MarketError, OrderRef};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub struct RestMarketClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestMarketClient {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var("EXCHANGE_API_KEY").ok(),
            timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn orderbook(&self, market_id: &str) -> Result<Orderbook, MarketError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/markets/{market_id}/orderbook"),
            )
            .send()
            .await
            .map_err(|e| MarketError::Exchange(e.to_string()))?;
        let response = ok_or_market_error(market_id, response)?;
        let body: OrderbookResponse = response
            .json()
            .await
            .map_err(|e| MarketError::Exchange(format!("orderbook decode: {e}")))?;
        Ok(body.orderbook)
    }
}

fn ok_or_market_error(
    market_id: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, MarketError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(MarketError::NotFound(market_id.to_string())),
        status => Err(MarketError::Exchange(format!("HTTP {status}"))),
    }
}

#[derive(Deserialize)]
struct MarketResponse {
    market: MarketPayload,
}

#[derive(Deserialize)]
struct MarketPayload {
    title: String,
    status: Option<String>,
    volume_24h: Option<f64>,
    liquidity: Option<f64>,
    open_interest: Option<i64>,
    close_time: Option<DateTime<Utc>>,
}

/// Price levels as `[price, quantity]` pairs, bids only; prices in
/// dollars. A yes ask is implied by the best no bid and vice versa.
#[derive(Deserialize, Default)]
struct Orderbook {
    #[serde(default)]
    yes: Vec<[f64; 2]>,
    #[serde(default)]
    no: Vec<[f64; 2]>,
}

impl Orderbook {
    fn best_bid(levels: &[[f64; 2]]) -> Option<f64> {
        levels
            .iter()
            .map(|level| level[0])
            .fold(None, |best, price| match best {
                Some(b) if b >= price => Some(b),
                _ => Some(price),
            })
    }

    /// Mid of best bid and the ask implied by the opposite book.
    fn mid(&self, side: Side) -> Option<f64> {
        let (own, other) = match side {
            Side::Yes => (&self.yes, &self.no),
            Side::No => (&self.no, &self.yes),
        };
        let bid = Self::best_bid(own);
        let ask = Self::best_bid(other).map(|opposite| 1.0 - opposite);
        match (bid, ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            (bid, ask) => bid.or(ask),
        }
    }
}

#[derive(Deserialize)]
struct OrderbookResponse {
    orderbook: Orderbook,
}

#[derive(Deserialize)]
struct OrderResponse {
    order: OrderPayload,
}

#[derive(Deserialize)]
struct OrderPayload {
    order_id: Option<String>,
}

#[derive(Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    market_positions: Vec<PositionPayload>,
}

#[derive(Deserialize)]
struct PositionPayload {
    ticker: String,
    position: i64,
    #[serde(default)]
    total_cost: f64,
}

#[async_trait]
impl MarketClient for RestMarketClient {
    async fn market_facts(&self, market_id: &str) -> Result<MarketFacts, MarketError> {
        debug!(market = market_id, "fetching market facts");
        let response = self
            .request(reqwest::Method::GET, &format!("/markets/{market_id}"))
            .send()
            .await
            .map_err(|e| MarketError::Exchange(e.to_string()))?;
        let response = ok_or_market_error(market_id, response)?;
        let body: MarketResponse = response
            .json()
            .await
            .map_err(|e| MarketError::Exchange(format!("market decode: {e}")))?;

        Ok(MarketFacts {
            title: body.market.title,
            status: body.market.status,
            volume_24h: body.market.volume_24h,
            liquidity: body.market.liquidity,
            open_interest: body.market.open_interest,
            close_time: body.market.close_time,
        })
    }

    async fn mid_price(&self, market_id: &str, side: Side) -> Result<Option<f64>, MarketError> {
        let orderbook = self.orderbook(market_id).await?;
        Ok(orderbook.mid(side))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderRef, MarketError> {
        let mut body = json!({
            "ticker": order.market_id,
            "side": order.side,
            "action": order.action,
            "count": order.quantity,
            "type": "limit",
        });
        match order.side {
            Side::Yes => body["yes_price"] = json!(order.limit_price),
            Side::No => body["no_price"] = json!(order.limit_price),
        }

        let response = self
            .request(reqwest::Method::POST, "/orders")
            .json(&body)
            .send()
            .await
            .map_err(|e| MarketError::Exchange(e.to_string()))?;
        let response = ok_or_market_error(&order.market_id, response)?;
        let body: OrderResponse = response
            .json()
            .await
            .map_err(|e| MarketError::Exchange(format!("order decode: {e}")))?;
        Ok(OrderRef {
            order_id: body.order.order_id,
        })
    }

    async fn position(&self, market_id: &str) -> Result<Option<ExchangePosition>, MarketError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/portfolio/positions?ticker={market_id}"),
            )
            .send()
            .await
            .map_err(|e| MarketError::Exchange(e.to_string()))?;
        let response = ok_or_market_error(market_id, response)?;
        let body: PositionsResponse = response
            .json()
            .await
            .map_err(|e| MarketError::Exchange(format!("positions decode: {e}")))?;

        Ok(body
            .market_positions
            .into_iter()
            .find(|p| p.ticker == market_id)
            .map(|p| ExchangePosition {
                market_id: p.ticker,
                contracts: p.position,
                total_cost: p.total_cost,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_price_uses_implied_ask() {
        let orderbook = Orderbook {
            yes: vec![[0.52, 100.0], [0.50, 200.0]],
            no: vec![[0.42, 150.0]],
        };
        // yes: bid 0.52, implied ask 1 - 0.42 = 0.58 -> mid 0.55
        assert_eq!(orderbook.mid(Side::Yes), Some(0.55));
        // no: bid 0.42, implied ask 1 - 0.52 = 0.48 -> mid 0.45
        let no_mid = orderbook.mid(Side::No).unwrap();
        assert!((no_mid - 0.45).abs() < 1e-12);
    }

    #[test]
    fn one_sided_book_falls_back_to_available_quote() {
        let orderbook = Orderbook {
            yes: vec![[0.52, 100.0]],
            no: vec![],
        };
        assert_eq!(orderbook.mid(Side::Yes), Some(0.52));
        // no side: no bid, implied ask 0.48.
        assert_eq!(orderbook.mid(Side::No), Some(0.48));
        assert_eq!(Orderbook::default().mid(Side::Yes), None);
    }

    #[test]
    fn market_payload_decodes() {
        let json = r#"{
            "market": {
                "ticker": "TURNOUT-60",
                "title": "Will turnout exceed 60%?",
                "status": "open",
                "volume_24h": 820.0,
                "liquidity": 310.0,
                "open_interest": 1500,
                "close_time": "2026-11-03T23:59:00Z"
            }
        }"#;
        let response: MarketResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.market.title, "Will turnout exceed 60%?");
        assert_eq!(response.market.open_interest, Some(1500));
    }

    #[test]
    fn positions_decode_with_missing_fields() {
        let json = r#"{"market_positions": [{"ticker": "M", "position": -40}]}"#;
        let response: PositionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.market_positions[0].position, -40);
        assert_eq!(response.market_positions[0].total_cost, 0.0);
    }
}
