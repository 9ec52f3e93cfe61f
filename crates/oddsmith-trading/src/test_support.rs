//! Mock exchange client for exercising the trading pipeline without a
//! network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use oddsmith_models::market::{MarketFacts, OrderRequest, Side};

use crate::market::{ExchangePosition, MarketClient, MarketError, OrderRef};

#[derive(Clone)]
struct MockMarket {
    facts: MarketFacts,
    yes_mid: Option<f64>,
    no_mid: Option<f64>,
}

/// In-memory `MarketClient` with seedable facts and mid prices. Orders
/// are recorded; a failing variant errors on every call.
pub struct MockMarketClient {
    markets: Mutex<HashMap<String, MockMarket>>,
    orders: Mutex<Vec<OrderRequest>>,
    order_counter: AtomicUsize,
    fail_all: bool,
    fail_orders: bool,
}

impl MockMarketClient {
    pub fn new() -> Self {
        Self {
            markets: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            order_counter: AtomicUsize::new(0),
            fail_all: false,
            fail_orders: false,
        }
    }

    /// One market with healthy default facts and the given mid prices.
    pub fn with_market(market_id: &str, yes_mid: f64, no_mid: f64) -> Self {
        let client = Self::new();
        client.add_market(market_id, yes_mid, no_mid);
        client
    }

    /// Every call fails as if the exchange were unreachable.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    /// Market data works but order placement fails.
    pub fn with_failing_orders(market_id: &str, yes_mid: f64, no_mid: f64) -> Self {
        let client = Self::with_market(market_id, yes_mid, no_mid);
        Self {
            fail_orders: true,
            ..client
        }
    }

    pub fn add_market(&self, market_id: &str, yes_mid: f64, no_mid: f64) {
        self.add_market_with_facts(market_id, default_facts(market_id), yes_mid, no_mid);
    }

    pub fn add_market_with_facts(
        &self,
        market_id: &str,
        facts: MarketFacts,
        yes_mid: f64,
        no_mid: f64,
    ) {
        self.markets.lock().unwrap().insert(
            market_id.to_string(),
            MockMarket {
                facts,
                yes_mid: Some(yes_mid),
                no_mid: Some(no_mid),
            },
        );
    }

    pub fn set_prices(&self, market_id: &str, yes_mid: f64, no_mid: f64) {
        if let Some(market) = self.markets.lock().unwrap().get_mut(market_id) {
            market.yes_mid = Some(yes_mid);
            market.no_mid = Some(no_mid);
        }
    }

    /// Orders placed so far, in order.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

impl Default for MockMarketClient {
    fn default() -> Self {
        Self::new()
    }
}

fn default_facts(market_id: &str) -> MarketFacts {
    MarketFacts {
        title: format!("Mock market {market_id}"),
        status: Some("open".to_string()),
        volume_24h: Some(500.0),
        liquidity: Some(400.0),
        open_interest: Some(1000),
        close_time: None,
    }
}

#[async_trait]
impl MarketClient for MockMarketClient {
    async fn market_facts(&self, market_id: &str) -> Result<MarketFacts, MarketError> {
        if self.fail_all {
            return Err(MarketError::Exchange("mock exchange outage".to_string()));
        }
        self.markets
            .lock()
            .unwrap()
            .get(market_id)
            .map(|m| m.facts.clone())
            .ok_or_else(|| MarketError::NotFound(market_id.to_string()))
    }

    async fn mid_price(&self, market_id: &str, side: Side) -> Result<Option<f64>, MarketError> {
        if self.fail_all {
            return Err(MarketError::Exchange("mock exchange outage".to_string()));
        }
        let markets = self.markets.lock().unwrap();
        let market = markets
            .get(market_id)
            .ok_or_else(|| MarketError::NotFound(market_id.to_string()))?;
        Ok(match side {
            Side::Yes => market.yes_mid,
            Side::No => market.no_mid,
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderRef, MarketError> {
        if self.fail_all || self.fail_orders {
            return Err(MarketError::Exchange("mock order rejection".to_string()));
        }
        self.orders.lock().unwrap().push(order.clone());
        let n = self.order_counter.fetch_add(1, Ordering::SeqCst);
        Ok(OrderRef {
            order_id: Some(format!("mock-order-{n}")),
        })
    }

    async fn position(&self, _market_id: &str) -> Result<Option<ExchangePosition>, MarketError> {
        if self.fail_all {
            return Err(MarketError::Exchange("mock exchange outage".to_string()));
        }
        Ok(None)
    }
}
