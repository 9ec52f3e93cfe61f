//! oddsmith - multi-model consensus trading for binary prediction markets.
//!
//! Independent LLM estimators judge a market in two peer-reviewed
//! rounds; the calibrated consensus is compared against the live price
//! and turned into sized, risk-filtered trade recommendations behind a
//! manual-approval gate.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use oddsmith::models::{OddsmithConfig, ConsensusMethod};
//! use oddsmith::trading::{Analyzer, Strategy};
//! use oddsmith::exchange::RestMarketClient;
//! ```

pub use oddsmith_agents as agents;
pub use oddsmith_models as models;
pub use oddsmith_store as store;
pub use oddsmith_trading as trading;

pub mod exchange;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use oddsmith_agents::providers::{AnthropicAgent, GeminiAgent, OpenAiCompatAgent};
use oddsmith_agents::{ConsensusEngine, DependencyDetector, EstimatorAgent};
use oddsmith_models::config::OddsmithConfig;
use oddsmith_models::provider::ProviderId;
use oddsmith_store::Store;
use oddsmith_trading::{Analyzer, MarketClient, SignalGenerator, Strategy};

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> anyhow::Result<OddsmithConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {path}"))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config: {path}"))
}

/// Build the enabled estimator gateways. The provider set is a closed
/// enum, so an unknown name cannot reach here; a missing API key for an
/// enabled provider is a startup error, not a runtime lookup miss.
pub fn build_agents(config: &OddsmithConfig) -> anyhow::Result<Vec<Arc<dyn EstimatorAgent>>> {
    let timeout = Duration::from_secs(config.agents.request_timeout_seconds);
    let max_tokens = config.agents.max_tokens;

    let mut agents: Vec<Arc<dyn EstimatorAgent>> = Vec::new();
    for entry in config.agents.providers.iter().filter(|p| p.enabled) {
        let key_var = entry.provider.api_key_var();
        let api_key = std::env::var(key_var).with_context(|| {
            format!("{key_var} is not set (required for enabled provider {})", entry.provider)
        })?;
        let model = entry.resolved_model();
        let agent: Arc<dyn EstimatorAgent> = match entry.provider {
            ProviderId::Claude => {
                Arc::new(AnthropicAgent::new(api_key, model, max_tokens, timeout))
            }
            ProviderId::Openai => {
                Arc::new(OpenAiCompatAgent::openai(api_key, model, max_tokens, timeout))
            }
            ProviderId::Grok => {
                Arc::new(OpenAiCompatAgent::grok(api_key, model, max_tokens, timeout))
            }
            ProviderId::Gemini => Arc::new(GeminiAgent::new(api_key, model, timeout)),
        };
        agents.push(agent);
    }

    if agents.is_empty() {
        bail!("no estimator providers enabled in configuration");
    }
    Ok(agents)
}

/// Consensus engine with per-provider weights from configuration.
pub fn build_engine(config: &OddsmithConfig) -> anyhow::Result<ConsensusEngine> {
    let agents = build_agents(config)?;
    let weights = config
        .agents
        .providers
        .iter()
        .filter(|p| p.enabled)
        .map(|p| (p.provider, p.weight))
        .collect();
    Ok(ConsensusEngine::new(agents).with_weights(weights))
}

/// Dependency detector sharing the configured gateways.
pub fn build_detector(config: &OddsmithConfig) -> anyhow::Result<DependencyDetector> {
    let agents = build_agents(config)?;
    let screening = config.agents.screening_provider;
    if !agents.iter().any(|agent| agent.provider() == screening) {
        bail!("screening provider {screening} is not among the enabled providers");
    }
    Ok(DependencyDetector::new(agents, screening))
}

/// Wire the full trading stack: store, engine, analyzer, signal
/// generator and strategy orchestrator.
pub fn build_strategy(
    config: &OddsmithConfig,
    market: Arc<dyn MarketClient>,
) -> anyhow::Result<Strategy> {
    let store = Arc::new(Store::open(&config.store).context("failed to open store")?);
    let engine = Arc::new(build_engine(config)?);
    let analyzer = Analyzer::new(
        engine,
        Arc::clone(&market),
        Arc::clone(&store),
        config.agents.consensus_method,
    );
    let signals = SignalGenerator::new(analyzer, Arc::clone(&market), Arc::clone(&store));
    Ok(Strategy::new(
        signals,
        market,
        store,
        config.trading.clone(),
        config.risk.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsmith_models::config::ProviderConfig;

    fn config_with_providers(providers: Vec<ProviderConfig>) -> OddsmithConfig {
        let mut config = OddsmithConfig::default();
        config.agents.providers = providers;
        config
    }

    #[test]
    fn missing_api_key_is_a_startup_error() {
        std::env::remove_var("XAI_API_KEY");
        let config = config_with_providers(vec![ProviderConfig {
            provider: ProviderId::Grok,
            model: None,
            weight: 1.0,
            enabled: true,
        }]);
        let err = build_agents(&config).err().unwrap();
        assert!(err.to_string().contains("XAI_API_KEY"));
    }

    #[test]
    fn no_enabled_providers_is_rejected() {
        let config = config_with_providers(vec![ProviderConfig {
            provider: ProviderId::Claude,
            model: None,
            weight: 1.0,
            enabled: false,
        }]);
        let err = build_agents(&config).err().unwrap();
        assert!(err.to_string().contains("no estimator providers"));
    }
}
