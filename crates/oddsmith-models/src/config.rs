use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusMethod;
use crate::provider::ProviderId;

/// Top-level configuration, constructed once at process start and passed
/// by reference into every component. There is no global settings object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OddsmithConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

impl Default for OddsmithConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            agents: AgentsConfig::default(),
            trading: TradingConfig::default(),
            risk: RiskConfig::default(),
            exchange: ExchangeConfig::default(),
        }
    }
}

/// Persistence layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub sqlite_path: String,
    /// Maximum entries in the in-memory analysis hot cache.
    pub memory_max_capacity: u64,
    /// TTL in seconds for hot-cache entries. Freshness against
    /// `cache_hours` is still enforced per read.
    pub memory_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/oddsmith.db".to_string(),
            memory_max_capacity: 1_000,
            memory_ttl_seconds: 3_600,
        }
    }
}

/// Estimator-agent layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Per-call network timeout in seconds. This is the only timeout in
    /// the pipeline; rounds wait for every call to settle.
    pub request_timeout_seconds: u64,
    pub max_tokens: u32,
    pub consensus_method: ConsensusMethod,
    /// Single provider used by fast dependency screening.
    pub screening_provider: ProviderId,
    pub providers: Vec<ProviderConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 45,
            max_tokens: 1024,
            consensus_method: ConsensusMethod::IterativeReasoning,
            screening_provider: ProviderId::Grok,
            providers: ProviderId::ALL
                .iter()
                .map(|p| ProviderConfig {
                    provider: *p,
                    model: None,
                    weight: default_weight(),
                    enabled: true,
                })
                .collect(),
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// One estimator provider entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub provider: ProviderId,
    /// Override model. Falls back to `ProviderId::default_model`.
    pub model: Option<String>,
    /// Weight under the weighted-average method.
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

/// Signal generation and orchestration parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingConfig {
    /// Minimum divergence to emit an entry signal.
    pub entry_threshold: f64,
    /// Maximum residual divergence to emit an exit signal.
    pub exit_threshold: f64,
    /// Contracts at the reference divergence.
    pub base_position: i64,
    pub max_position: i64,
    /// Divergence that maps to exactly `base_position`.
    pub reference_divergence: f64,
    /// Sizing exponent; > 1 scales super-linearly with edge.
    pub scaling_factor: f64,
    /// Analysis freshness window in hours.
    pub cache_hours: i64,
    pub max_per_market: i64,
    pub max_total_exposure: i64,
    pub max_daily_trades: i64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            entry_threshold: 0.05,
            exit_threshold: 0.01,
            base_position: 10,
            max_position: 100,
            reference_divergence: 0.05,
            scaling_factor: 1.5,
            cache_hours: 24,
            max_per_market: 200,
            max_total_exposure: 1_000,
            max_daily_trades: 10,
        }
    }
}

/// Per-signal risk filter thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskConfig {
    pub min_liquidity: f64,
    pub min_volume_24h: f64,
    /// Soft cap: exceeding it warns, the caller clamps.
    pub max_position_size: i64,
    /// Tolerated |yes + no − 1.0| before the spread is considered unsafe.
    pub max_spread: f64,
    pub allowed_statuses: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_liquidity: 100.0,
            min_volume_24h: 50.0,
            max_position_size: 100,
            max_spread: 0.10,
            allowed_statuses: vec!["open".to_string()],
        }
    }
}

/// Exchange REST adapter configuration. The API key comes from the
/// `EXCHANGE_API_KEY` environment variable, not from this file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kalshi.com/v2".to_string(),
            request_timeout_seconds: 10,
        }
    }
}
