pub mod analyzer;
pub mod error;
pub mod market;
pub mod risk;
pub mod signals;
pub mod sizing;
pub mod strategy;

pub mod test_support;

pub use analyzer::{AnalysisOutcome, Analyzer};
pub use error::TradingError;
pub use market::{ExchangePosition, MarketClient, MarketError, OrderRef};
pub use signals::SignalGenerator;
pub use strategy::{compute_performance_stats, ExecutionOverrides, PerformanceStats, Strategy};
