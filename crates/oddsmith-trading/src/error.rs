use oddsmith_agents::ConsensusError;
use oddsmith_store::StoreError;
use thiserror::Error;

use crate::market::MarketError;

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("consensus failed: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("market data unavailable: {0}")]
    Market(#[from] MarketError),
}
