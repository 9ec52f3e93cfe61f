use std::sync::Arc;

use chrono::{Duration, Utc};
use oddsmith_agents::ConsensusEngine;
use oddsmith_models::consensus::ConsensusMethod;
use oddsmith_models::context::{AnalysisDigest, MarketSnapshot, PositionFacts};
use oddsmith_models::market::Side;
use oddsmith_store::{MarketRecord, NewAnalysis, Store, StoredAnalysis};
use tracing::{info, warn};

use crate::error::TradingError;
use crate::market::MarketClient;

const HISTORY_LIMIT: usize = 5;

/// A consensus run's stored record, flagged with whether it came from
/// the freshness cache or a live run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: StoredAnalysis,
    pub from_cache: bool,
}

/// Orchestrates one market analysis: freshness check, snapshot
/// assembly, consensus run, append-only persistence.
#[derive(Clone)]
pub struct Analyzer {
    engine: Arc<ConsensusEngine>,
    market: Arc<dyn MarketClient>,
    store: Arc<Store>,
    method: ConsensusMethod,
}

impl Analyzer {
    pub fn new(
        engine: Arc<ConsensusEngine>,
        market: Arc<dyn MarketClient>,
        store: Arc<Store>,
        method: ConsensusMethod,
    ) -> Self {
        Self {
            engine,
            market,
            store,
            method,
        }
    }

    pub fn method(&self) -> ConsensusMethod {
        self.method
    }

    /// Analyze `market_id`, reusing a stored analysis younger than
    /// `cache_hours` unless `force` is set. A forced run always writes
    /// and its result is what later reads observe.
    pub async fn analyze(
        &self,
        market_id: &str,
        option: Option<&str>,
        force: bool,
        cache_hours: i64,
    ) -> Result<AnalysisOutcome, TradingError> {
        let option_key = option.unwrap_or(market_id);

        if !force {
            if let Some(analysis) = self
                .store
                .fresh_analysis(market_id, option_key, Duration::hours(cache_hours))
                .await?
            {
                info!(market = market_id, option = option_key, "using cached analysis");
                return Ok(AnalysisOutcome {
                    analysis,
                    from_cache: true,
                });
            }
        }

        let facts = self.market.market_facts(market_id).await?;

        // Auto-register unknown markets so history chains have a home.
        if !self.store.market_exists(market_id)? {
            self.store.upsert_market(&MarketRecord {
                id: market_id.to_string(),
                title: facts.title.clone(),
                close_time: facts.close_time,
                status: facts.status.clone(),
                category: None,
                metadata: None,
            })?;
        }

        let yes_price = self.market.mid_price(market_id, Side::Yes).await?;
        let no_price = self.market.mid_price(market_id, Side::No).await?;

        let position = self
            .store
            .positions_by_market(market_id)?
            .into_iter()
            .find(|p| p.quantity > 0)
            .map(|p| PositionFacts {
                side: p.side,
                quantity: p.quantity,
                avg_price: p.avg_price,
                unrealized_pnl: p.unrealized_pnl,
            });

        let history = self
            .store
            .analysis_history(market_id, HISTORY_LIMIT)?
            .into_iter()
            .map(|analysis| AnalysisDigest {
                analyzed_at: analysis.analyzed_at,
                yes_confidence: analysis.consensus.yes_confidence,
                no_confidence: analysis.consensus.no_confidence,
            })
            .collect();

        let snapshot = MarketSnapshot {
            market_id: market_id.to_string(),
            title: facts.title.clone(),
            status: facts.status.clone(),
            close_time: facts.close_time,
            yes_price,
            no_price,
            volume_24h: facts.volume_24h,
            liquidity: facts.liquidity,
            open_interest: facts.open_interest,
            position,
            history,
        };

        let previous_analysis_id = self
            .store
            .latest_analysis(market_id, option_key)?
            .map(|analysis| analysis.id);

        let consensus = self.engine.run(&snapshot, self.method).await?;
        for provider in consensus.absent() {
            warn!(market = market_id, %provider, "provider absent from final consensus");
        }

        let analysis = self
            .store
            .store_analysis(NewAnalysis {
                market_id: market_id.to_string(),
                option: option_key.to_string(),
                analyzed_at: Utc::now(),
                consensus,
                yes_price,
                no_price,
                volume_24h: facts.volume_24h,
                liquidity: facts.liquidity,
                previous_analysis_id,
            })
            .await?;

        info!(
            market = market_id,
            option = option_key,
            analysis_id = analysis.id,
            yes = analysis.consensus.yes_confidence,
            no = analysis.consensus.no_confidence,
            "analysis stored"
        );
        Ok(AnalysisOutcome {
            analysis,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockMarketClient;
    use oddsmith_agents::test_support::ScriptedAgent;
    use oddsmith_agents::EstimatorAgent;
    use oddsmith_models::provider::ProviderId;
    use oddsmith_store::Database;

    fn test_store() -> Arc<Store> {
        Arc::new(Store::new(
            Database::open_in_memory().unwrap(),
            100,
            std::time::Duration::from_secs(60),
        ))
    }

    fn analyzer_with(
        agents: Vec<Arc<ScriptedAgent>>,
        market: Arc<MockMarketClient>,
        store: Arc<Store>,
    ) -> Analyzer {
        let engine = ConsensusEngine::new(
            agents
                .into_iter()
                .map(|a| a as Arc<dyn EstimatorAgent>)
                .collect(),
        );
        Analyzer::new(
            Arc::new(engine),
            market,
            store,
            ConsensusMethod::SimpleAverage,
        )
    }

    #[tokio::test]
    async fn fresh_run_persists_and_registers_market() {
        let agent = Arc::new(ScriptedAgent::steady(ProviderId::Claude, 0.7, 0.3));
        let market = Arc::new(MockMarketClient::with_market("M", 0.55, 0.46));
        let store = test_store();
        let analyzer = analyzer_with(vec![Arc::clone(&agent)], market, Arc::clone(&store));

        let outcome = analyzer.analyze("M", None, false, 24).await.unwrap();
        assert!(!outcome.from_cache);
        assert_eq!(outcome.analysis.consensus.yes_confidence, 0.7);
        assert_eq!(outcome.analysis.yes_price, Some(0.55));
        assert!(store.market_exists("M").unwrap());
        assert_eq!(agent.contexts().len(), 1);
    }

    #[tokio::test]
    async fn second_call_within_window_uses_cache() {
        let agent = Arc::new(ScriptedAgent::steady(ProviderId::Claude, 0.7, 0.3));
        let market = Arc::new(MockMarketClient::with_market("M", 0.55, 0.46));
        let store = test_store();
        let analyzer = analyzer_with(vec![Arc::clone(&agent)], market, store);

        analyzer.analyze("M", None, false, 24).await.unwrap();
        let cached = analyzer.analyze("M", None, false, 24).await.unwrap();
        assert!(cached.from_cache);
        // No second agent call happened.
        assert_eq!(agent.contexts().len(), 1);
    }

    #[tokio::test]
    async fn force_bypasses_cache_and_chains_previous() {
        let agent = Arc::new(ScriptedAgent::steady(ProviderId::Claude, 0.7, 0.3));
        let market = Arc::new(MockMarketClient::with_market("M", 0.55, 0.46));
        let store = test_store();
        let analyzer = analyzer_with(vec![Arc::clone(&agent)], market, store);

        let first = analyzer.analyze("M", None, false, 24).await.unwrap();
        let forced = analyzer.analyze("M", None, true, 24).await.unwrap();
        assert!(!forced.from_cache);
        assert_eq!(agent.contexts().len(), 2);
        assert_eq!(
            forced.analysis.previous_analysis_id,
            Some(first.analysis.id)
        );

        // The forced result is what subsequent cached reads observe.
        let after = analyzer.analyze("M", None, false, 24).await.unwrap();
        assert!(after.from_cache);
        assert_eq!(after.analysis.id, forced.analysis.id);
    }

    #[tokio::test]
    async fn market_data_failure_is_fatal_for_the_analysis() {
        let agent = Arc::new(ScriptedAgent::steady(ProviderId::Claude, 0.7, 0.3));
        let market = Arc::new(MockMarketClient::failing());
        let store = test_store();
        let analyzer = analyzer_with(vec![agent], market, store);

        let err = analyzer.analyze("M", None, false, 24).await.unwrap_err();
        assert!(matches!(err, TradingError::Market(_)));
    }

    #[tokio::test]
    async fn quorum_exhaustion_propagates() {
        let agent = Arc::new(ScriptedAgent::failing(ProviderId::Claude));
        let market = Arc::new(MockMarketClient::with_market("M", 0.55, 0.46));
        let store = test_store();
        let analyzer = analyzer_with(vec![agent], market, Arc::clone(&store));

        let err = analyzer.analyze("M", None, false, 24).await.unwrap_err();
        assert!(matches!(err, TradingError::Consensus(_)));
        // Nothing was persisted for the failed run.
        assert!(store.latest_analysis("M", "M").unwrap().is_none());
    }
}
