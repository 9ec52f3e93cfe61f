use async_trait::async_trait;
use oddsmith_models::market::{MarketFacts, OrderRequest, Side};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("market not found: {0}")]
    NotFound(String),

    #[error("exchange error: {0}")]
    Exchange(String),
}

/// Reference to a placed order as reported by the exchange.
#[derive(Debug, Clone)]
pub struct OrderRef {
    pub order_id: Option<String>,
}

/// Net exchange position for a market, signed (positive = yes side).
#[derive(Debug, Clone)]
pub struct ExchangePosition {
    pub market_id: String,
    pub contracts: i64,
    pub total_cost: f64,
}

/// The consumed exchange boundary. Signal generation treats a failure
/// here as fatal for that market only; consensus alone does not need it.
#[async_trait]
pub trait MarketClient: Send + Sync {
    async fn market_facts(&self, market_id: &str) -> Result<MarketFacts, MarketError>;

    /// Mid price for one side, if the orderbook has one.
    async fn mid_price(&self, market_id: &str, side: Side) -> Result<Option<f64>, MarketError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderRef, MarketError>;

    async fn position(&self, market_id: &str) -> Result<Option<ExchangePosition>, MarketError>;
}
