use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use oddsmith_models::config::StoreConfig;
use oddsmith_models::signal::{Decision, SignalType, TradeDecision, TradingSignal};
use tracing::debug;

use crate::error::StoreError;
use crate::memory::MemoryCache;
use crate::schema::{MarketRecord, NewAnalysis, PositionRecord, StoredAnalysis};
use crate::sqlite::Database;

/// The persistence facade handed to the analyzer and strategy layers.
///
/// Analysis reads go moka (hot) → SQLite (latest row) → None, with SQLite
/// hits promoted to moka. Everything else is a direct passthrough.
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection`
/// is not `Sync`.
pub struct Store {
    memory: MemoryCache,
    db: Mutex<Database>,
}

impl Store {
    pub fn new(db: Database, max_capacity: u64, hot_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, hot_ttl),
            db: Mutex::new(db),
        }
    }

    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let db = Database::open(&config.sqlite_path)?;
        Ok(Self::new(
            db,
            config.memory_max_capacity,
            Duration::from_secs(config.memory_ttl_seconds),
        ))
    }

    fn db(&self) -> Result<std::sync::MutexGuard<'_, Database>, StoreError> {
        self.db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    fn hot_key(market_id: &str, option: &str) -> String {
        format!("{market_id}|{option}")
    }

    // ---- analyses (read-through) ----

    /// Latest analysis for (market, option) if it is younger than
    /// `max_age`. Stale and missing both return `None`; callers decide
    /// whether to run a fresh consensus.
    pub async fn fresh_analysis(
        &self,
        market_id: &str,
        option: &str,
        max_age: chrono::Duration,
    ) -> Result<Option<StoredAnalysis>, StoreError> {
        let key = Self::hot_key(market_id, option);
        let now = Utc::now();

        if let Some(json) = self.memory.get(&key).await {
            let analysis: StoredAnalysis = serde_json::from_str(&json)?;
            if analysis.is_fresh(max_age, now) {
                debug!(market = market_id, option, "analysis served from hot cache");
                return Ok(Some(analysis));
            }
            self.memory.invalidate(&key).await;
        }

        let latest = self.db()?.latest_analysis(market_id, option)?;
        if let Some(analysis) = latest {
            self.memory
                .insert(key, serde_json::to_string(&analysis)?)
                .await;
            if analysis.is_fresh(max_age, now) {
                return Ok(Some(analysis));
            }
        }
        Ok(None)
    }

    /// Append a completed consensus run and return the stored record.
    /// The new row becomes what subsequent freshness reads observe.
    pub async fn store_analysis(&self, new: NewAnalysis) -> Result<StoredAnalysis, StoreError> {
        let id = self.db()?.insert_analysis(&new)?;
        let stored = StoredAnalysis {
            id,
            market_id: new.market_id,
            option: new.option,
            analyzed_at: new.analyzed_at,
            consensus: new.consensus,
            yes_price: new.yes_price,
            no_price: new.no_price,
            volume_24h: new.volume_24h,
            liquidity: new.liquidity,
            previous_analysis_id: new.previous_analysis_id,
        };
        let key = Self::hot_key(&stored.market_id, &stored.option);
        self.memory
            .insert(key, serde_json::to_string(&stored)?)
            .await;
        Ok(stored)
    }

    pub fn latest_analysis(
        &self,
        market_id: &str,
        option: &str,
    ) -> Result<Option<StoredAnalysis>, StoreError> {
        self.db()?.latest_analysis(market_id, option)
    }

    pub fn analysis_history(
        &self,
        market_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredAnalysis>, StoreError> {
        self.db()?.analysis_history(market_id, limit)
    }

    // ---- markets ----

    pub fn upsert_market(&self, market: &MarketRecord) -> Result<(), StoreError> {
        self.db()?.upsert_market(market)
    }

    pub fn get_market(&self, id: &str) -> Result<Option<MarketRecord>, StoreError> {
        self.db()?.get_market(id)
    }

    pub fn all_markets(&self) -> Result<Vec<MarketRecord>, StoreError> {
        self.db()?.all_markets()
    }

    pub fn market_exists(&self, id: &str) -> Result<bool, StoreError> {
        self.db()?.market_exists(id)
    }

    // ---- positions ----

    pub fn upsert_position(&self, position: &PositionRecord) -> Result<(), StoreError> {
        self.db()?.upsert_position(position)
    }

    pub fn positions_by_market(&self, market_id: &str) -> Result<Vec<PositionRecord>, StoreError> {
        self.db()?.positions_by_market(market_id)
    }

    pub fn open_positions(&self) -> Result<Vec<PositionRecord>, StoreError> {
        self.db()?.open_positions()
    }

    // ---- signals & decisions ----

    pub fn insert_signal(&self, signal: &TradingSignal) -> Result<(), StoreError> {
        self.db()?.insert_signal(signal)
    }

    pub fn recent_signals(
        &self,
        limit: usize,
        kind: Option<SignalType>,
    ) -> Result<Vec<TradingSignal>, StoreError> {
        self.db()?.recent_signals(limit, kind)
    }

    pub fn insert_decision(&self, decision: &TradeDecision) -> Result<(), StoreError> {
        self.db()?.insert_decision(decision)
    }

    pub fn decision_history(
        &self,
        limit: usize,
        filter: Option<Decision>,
    ) -> Result<Vec<TradeDecision>, StoreError> {
        self.db()?.decision_history(limit, filter)
    }

    pub fn executed_trades_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        self.db()?.executed_trades_since(since)
    }

    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use oddsmith_models::consensus::{ConsensusMethod, ConsensusResult};
    use std::collections::BTreeMap;

    fn consensus(yes: f64) -> ConsensusResult {
        ConsensusResult {
            yes_confidence: yes,
            no_confidence: 1.0 - yes,
            method: ConsensusMethod::SimpleAverage,
            agent_count: 2,
            judgments: BTreeMap::new(),
            rounds_completed: 1,
            round1: None,
            convergence: None,
        }
    }

    fn new_analysis(yes: f64, age: ChronoDuration) -> NewAnalysis {
        NewAnalysis {
            market_id: "M".to_string(),
            option: "M".to_string(),
            analyzed_at: Utc::now() - age,
            consensus: consensus(yes),
            yes_price: Some(0.5),
            no_price: Some(0.5),
            volume_24h: None,
            liquidity: None,
            previous_analysis_id: None,
        }
    }

    fn test_store() -> Store {
        Store::new(
            Database::open_in_memory().unwrap(),
            100,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn fresh_analysis_misses_when_empty() {
        let store = test_store();
        let result = store
            .fresh_analysis("M", "M", ChronoDuration::hours(24))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fresh_analysis_read_through_promotes_to_hot() {
        let store = test_store();
        store
            .store_analysis(new_analysis(0.6, ChronoDuration::zero()))
            .await
            .unwrap();
        // Wipe the hot layer so the next read must hit SQLite.
        store.memory.invalidate("M|M").await;
        assert_eq!(store.hot_cache_size(), 0);

        let result = store
            .fresh_analysis("M", "M", ChronoDuration::hours(24))
            .await
            .unwrap();
        assert_eq!(result.unwrap().consensus.yes_confidence, 0.6);
        assert!(store.memory.get("M|M").await.is_some());
    }

    #[tokio::test]
    async fn stale_analysis_is_not_returned() {
        let store = test_store();
        store
            .store_analysis(new_analysis(0.6, ChronoDuration::hours(30)))
            .await
            .unwrap();

        let result = store
            .fresh_analysis("M", "M", ChronoDuration::hours(24))
            .await
            .unwrap();
        assert!(result.is_none());

        // Same row passes under a wider window.
        let result = store
            .fresh_analysis("M", "M", ChronoDuration::hours(48))
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn store_analysis_supersedes_prior_reads() {
        let store = test_store();
        let first = store
            .store_analysis(new_analysis(0.5, ChronoDuration::zero()))
            .await
            .unwrap();
        let mut second = new_analysis(0.8, ChronoDuration::zero());
        second.previous_analysis_id = Some(first.id);
        store.store_analysis(second).await.unwrap();

        let result = store
            .fresh_analysis("M", "M", ChronoDuration::hours(24))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.consensus.yes_confidence, 0.8);
        assert_eq!(result.previous_analysis_id, Some(first.id));
    }
}
