pub mod config;
pub mod consensus;
pub mod context;
pub mod dependency;
pub mod judgment;
pub mod market;
pub mod provider;
pub mod signal;

pub use config::{
    AgentsConfig, ExchangeConfig, OddsmithConfig, ProviderConfig, RiskConfig, StoreConfig,
    TradingConfig,
};
pub use consensus::{ConsensusMethod, ConsensusResult, ConvergenceMetrics};
pub use context::{AnalysisContext, AnalysisDigest, MarketSnapshot, PositionFacts};
pub use dependency::{
    Constraint, ConstraintKind, DependencyConsensus, DependencyJudgment, DependencyKind,
    EventPair, ScoreConvergence, ScreeningResult,
};
pub use judgment::{AgentOutcome, Judgment, PeerJudgment};
pub use market::{MarketFacts, OrderRequest, Side};
pub use provider::ProviderId;
pub use signal::{Decision, SignalType, TradeAction, TradeDecision, TradingSignal};
