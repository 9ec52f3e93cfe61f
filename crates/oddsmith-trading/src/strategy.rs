use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use oddsmith_models::config::{RiskConfig, TradingConfig};
use oddsmith_models::market::OrderRequest;
use oddsmith_models::signal::{Decision, SignalType, TradeDecision, TradingSignal};
use oddsmith_store::{PositionRecord, Store};
use tracing::{info, warn};

use crate::error::TradingError;
use crate::market::MarketClient;
use crate::risk::{check_daily_trade_limit, check_position_limits, needs_exposure_checks};
use crate::signals::SignalGenerator;

/// Overrides a human can apply when approving a signal.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOverrides {
    pub quantity: Option<i64>,
    pub price: Option<f64>,
    pub notes: Option<String>,
}

/// Aggregates over the decision log.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    pub total_signals: usize,
    pub total_decisions: usize,
    pub approved: usize,
    pub rejected: usize,
    pub executed: usize,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

/// Sequences scanning, exit monitoring and manual-approval execution.
/// Portfolio-wide limits live here, not in the per-signal filter,
/// because they need state the filter does not own.
pub struct Strategy {
    signals: SignalGenerator,
    market: Arc<dyn MarketClient>,
    store: Arc<Store>,
    trading: TradingConfig,
    risk: RiskConfig,
}

impl Strategy {
    pub fn new(
        signals: SignalGenerator,
        market: Arc<dyn MarketClient>,
        store: Arc<Store>,
        trading: TradingConfig,
        risk: RiskConfig,
    ) -> Self {
        Self {
            signals,
            market,
            store,
            trading,
            risk,
        }
    }

    pub fn signal_generator(&self) -> &SignalGenerator {
        &self.signals
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Scan markets for entry opportunities, best divergence first.
    /// Per-market failures are logged and skipped; only signals that
    /// passed the risk filters are returned.
    pub async fn scan(
        &self,
        market_ids: Option<&[String]>,
        force: bool,
    ) -> Result<Vec<TradingSignal>, TradingError> {
        let markets: Vec<String> = match market_ids {
            Some(ids) => ids.to_vec(),
            None => self
                .store
                .all_markets()?
                .into_iter()
                .map(|market| market.id)
                .collect(),
        };

        let mut opportunities = Vec::new();
        for market_id in &markets {
            match self
                .signals
                .entry_signal(market_id, None, &self.trading, &self.risk, force)
                .await
            {
                Ok(Some(signal)) if signal.passed_filters => opportunities.push(signal),
                Ok(_) => {}
                Err(error) => {
                    warn!(market = %market_id, %error, "skipping market during scan");
                }
            }
        }

        opportunities.sort_by(|a, b| {
            b.divergence_magnitude
                .partial_cmp(&a.divergence_magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!(
            scanned = markets.len(),
            opportunities = opportunities.len(),
            "scan complete"
        );
        Ok(opportunities)
    }

    /// Check every open position for convergence-based exits.
    pub async fn monitor_exits(&self, force: bool) -> Result<Vec<TradingSignal>, TradingError> {
        let positions = self.store.open_positions()?;
        let mut exits = Vec::new();
        for position in &positions {
            match self.signals.exit_signal(position, &self.trading, force).await {
                Ok(Some(signal)) => exits.push(signal),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        market = %position.market_id,
                        %error,
                        "skipping position during exit check"
                    );
                }
            }
        }
        Ok(exits)
    }

    /// Record the verdict on a signal and, if approved, place the order
    /// and update the stored position. Execution failures are recorded
    /// on the decision, not raised.
    pub async fn execute(
        &self,
        signal: &TradingSignal,
        decision: Decision,
        overrides: ExecutionOverrides,
    ) -> Result<TradeDecision, TradingError> {
        if decision != Decision::Approved {
            let record = TradeDecision::unexecuted(signal.id, decision, overrides.notes);
            self.store.insert_decision(&record)?;
            return Ok(record);
        }

        // The per-signal filter only warned about oversize; clamp here.
        let quantity = overrides
            .quantity
            .unwrap_or(signal.quantity)
            .min(self.risk.max_position_size);
        let price = overrides.price.unwrap_or(signal.price);

        if let Some(refusal) = self.pre_trade_refusal(signal, quantity)? {
            warn!(market = %signal.market_id, reason = %refusal, "refusing execution");
            let record =
                TradeDecision::unexecuted(signal.id, Decision::Approved, Some(refusal));
            self.store.insert_decision(&record)?;
            return Ok(record);
        }

        let order = OrderRequest {
            market_id: signal.market_id.clone(),
            side: signal.action.side(),
            action: if signal.action.is_buy() { "buy" } else { "sell" }.to_string(),
            quantity,
            limit_price: price,
        };

        let mut record = TradeDecision::unexecuted(signal.id, Decision::Approved, overrides.notes);
        match self.market.place_order(&order).await {
            Ok(order_ref) => {
                let position = match signal.signal_type {
                    SignalType::Entry => PositionRecord {
                        market_id: signal.market_id.clone(),
                        option: signal.option.clone(),
                        side: signal.action.side(),
                        quantity,
                        avg_price: price,
                        unrealized_pnl: None,
                    },
                    // No partial exits: an executed exit closes the lot.
                    SignalType::Exit => PositionRecord {
                        market_id: signal.market_id.clone(),
                        option: signal.option.clone(),
                        side: signal.action.side(),
                        quantity: 0,
                        avg_price: 0.0,
                        unrealized_pnl: None,
                    },
                };
                self.store.upsert_position(&position)?;

                record.executed = true;
                record.executed_at = Some(Utc::now());
                record.order_id = order_ref.order_id;
                record.actual_quantity = Some(quantity);
                record.actual_price = Some(price);
                match signal.signal_type {
                    SignalType::Entry => {
                        record.execution_cost = Some(quantity as f64 * price);
                    }
                    SignalType::Exit => {
                        record.realized_pnl = Some(signal.expected_profit);
                    }
                }
                info!(
                    market = %signal.market_id,
                    quantity,
                    price,
                    order_id = ?record.order_id,
                    "order placed"
                );
            }
            Err(error) => {
                warn!(market = %signal.market_id, %error, "order placement failed");
                record.notes = Some(format!("Execution failed: {error}"));
            }
        }

        self.store.insert_decision(&record)?;
        Ok(record)
    }

    /// Portfolio-level checks that precede any order: daily throttle
    /// and, for entries, cross-position exposure caps.
    fn pre_trade_refusal(
        &self,
        signal: &TradingSignal,
        quantity: i64,
    ) -> Result<Option<String>, TradingError> {
        let day_start = Utc::now()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let trades_today = self.store.executed_trades_since(day_start)?;
        let (allowed, message) = check_daily_trade_limit(trades_today, self.trading.max_daily_trades);
        if !allowed {
            return Ok(Some(message));
        }

        if needs_exposure_checks(signal) {
            let positions = self.store.open_positions()?;
            let (allowed, message) = check_position_limits(
                &signal.market_id,
                quantity,
                &positions,
                self.trading.max_per_market,
                self.trading.max_total_exposure,
            );
            if !allowed {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Win/loss aggregates over recorded decisions.
    pub fn performance_stats(&self) -> Result<PerformanceStats, TradingError> {
        compute_performance_stats(&self.store)
    }
}

/// Win/loss aggregates over the decision log, usable without a full
/// strategy stack.
pub fn compute_performance_stats(store: &Store) -> Result<PerformanceStats, TradingError> {
    let signals = store.recent_signals(1000, None)?;
    let decisions = store.decision_history(1000, None)?;

    let approved = decisions
        .iter()
        .filter(|d| d.decision == Decision::Approved)
        .count();
    let executed = decisions.iter().filter(|d| d.executed).count();
    let closed: Vec<&TradeDecision> = decisions
        .iter()
        .filter(|d| d.executed && d.realized_pnl.is_some())
        .collect();
    let total_pnl: f64 = closed.iter().filter_map(|d| d.realized_pnl).sum();
    let wins = closed
        .iter()
        .filter(|d| d.realized_pnl.unwrap_or(0.0) > 0.0)
        .count();
    let losses = closed
        .iter()
        .filter(|d| d.realized_pnl.unwrap_or(0.0) < 0.0)
        .count();

    Ok(PerformanceStats {
        total_signals: signals.len(),
        total_decisions: decisions.len(),
        approved,
        rejected: decisions.len() - approved,
        executed,
        closed_trades: closed.len(),
        wins,
        losses,
        total_pnl,
        win_rate: if closed.is_empty() {
            0.0
        } else {
            wins as f64 / closed.len() as f64
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::test_support::MockMarketClient;
    use oddsmith_agents::test_support::ScriptedAgent;
    use oddsmith_agents::{ConsensusEngine, EstimatorAgent};
    use oddsmith_models::consensus::ConsensusMethod;
    use oddsmith_models::market::Side;
    use oddsmith_models::provider::ProviderId;
    use oddsmith_store::{Database, MarketRecord};

    fn test_store() -> Arc<Store> {
        Arc::new(Store::new(
            Database::open_in_memory().unwrap(),
            100,
            std::time::Duration::from_secs(60),
        ))
    }

    fn strategy_with(
        consensus_yes: f64,
        consensus_no: f64,
        market: Arc<MockMarketClient>,
        store: Arc<Store>,
    ) -> Strategy {
        let agent = Arc::new(ScriptedAgent::steady(
            ProviderId::Claude,
            consensus_yes,
            consensus_no,
        ));
        let engine = ConsensusEngine::new(vec![agent as Arc<dyn EstimatorAgent>]);
        let analyzer = Analyzer::new(
            Arc::new(engine),
            Arc::clone(&market) as Arc<dyn MarketClient>,
            Arc::clone(&store),
            ConsensusMethod::SimpleAverage,
        );
        let signals = SignalGenerator::new(
            analyzer,
            Arc::clone(&market) as Arc<dyn MarketClient>,
            Arc::clone(&store),
        );
        Strategy::new(
            signals,
            market,
            store,
            TradingConfig::default(),
            RiskConfig::default(),
        )
    }

    fn track_market(store: &Store, id: &str) {
        store
            .upsert_market(&MarketRecord {
                id: id.to_string(),
                title: format!("Market {id}"),
                close_time: None,
                status: Some("open".to_string()),
                category: None,
                metadata: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn scan_ranks_passing_signals_by_divergence() {
        let market = Arc::new(MockMarketClient::new());
        // BIG diverges by 0.25, SMALL by 0.10; both underpriced on yes.
        market.add_market("BIG", 0.45, 0.53);
        market.add_market("SMALL", 0.60, 0.33);
        let store = test_store();
        track_market(&store, "SMALL");
        track_market(&store, "BIG");

        let strategy = strategy_with(0.70, 0.29, market, Arc::clone(&store));
        let signals = strategy.scan(None, false).await.unwrap();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].market_id, "BIG");
        assert!(signals[0].divergence_magnitude > signals[1].divergence_magnitude);
        assert!(signals.iter().all(|s| s.passed_filters));
    }

    #[tokio::test]
    async fn scan_skips_failing_markets() {
        let market = Arc::new(MockMarketClient::with_market("OK", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "OK");
        track_market(&store, "MISSING"); // not known to the mock exchange

        let strategy = strategy_with(0.70, 0.29, market, Arc::clone(&store));
        let signals = strategy.scan(None, false).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].market_id, "OK");
    }

    #[tokio::test]
    async fn rejected_signal_records_decision_without_order() {
        let market = Arc::new(MockMarketClient::with_market("M", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "M");
        let strategy = strategy_with(0.70, 0.29, market, Arc::clone(&store));

        let signal = strategy.scan(None, false).await.unwrap().remove(0);
        let decision = strategy
            .execute(&signal, Decision::Rejected, ExecutionOverrides::default())
            .await
            .unwrap();

        assert_eq!(decision.decision, Decision::Rejected);
        assert!(!decision.executed);
        assert_eq!(store.decision_history(10, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approved_entry_places_order_and_updates_position() {
        let market = Arc::new(MockMarketClient::with_market("M", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "M");
        let strategy = strategy_with(0.70, 0.29, Arc::clone(&market), Arc::clone(&store));

        let signal = strategy.scan(None, false).await.unwrap().remove(0);
        let decision = strategy
            .execute(&signal, Decision::Approved, ExecutionOverrides::default())
            .await
            .unwrap();

        assert!(decision.executed);
        assert!(decision.order_id.is_some());
        assert_eq!(decision.actual_quantity, Some(signal.quantity));
        assert_eq!(
            decision.execution_cost,
            Some(signal.quantity as f64 * signal.price)
        );

        let orders = market.placed_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].action, "buy");
        assert_eq!(orders[0].side, Side::Yes);

        let positions = store.positions_by_market("M").unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, signal.quantity);
    }

    #[tokio::test]
    async fn order_failure_is_recorded_not_raised() {
        let market = Arc::new(MockMarketClient::with_failing_orders("M", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "M");
        let strategy = strategy_with(0.70, 0.29, market, Arc::clone(&store));

        let signal = strategy.scan(None, false).await.unwrap().remove(0);
        let decision = strategy
            .execute(&signal, Decision::Approved, ExecutionOverrides::default())
            .await
            .unwrap();

        assert!(!decision.executed);
        assert!(decision.notes.as_deref().unwrap().contains("Execution failed"));
        assert!(store.positions_by_market("M").unwrap().is_empty());
    }

    #[tokio::test]
    async fn exposure_cap_refuses_oversized_entry() {
        let market = Arc::new(MockMarketClient::with_market("M", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "M");
        // Existing exposure close to the per-market cap of 200.
        store
            .upsert_position(&PositionRecord {
                market_id: "M".to_string(),
                option: "M".to_string(),
                side: Side::No,
                quantity: 190,
                avg_price: 0.5,
                unrealized_pnl: None,
            })
            .unwrap();
        let strategy = strategy_with(0.70, 0.29, Arc::clone(&market), Arc::clone(&store));

        let signal = strategy.scan(None, false).await.unwrap().remove(0);
        assert!(signal.quantity > 10);
        let decision = strategy
            .execute(&signal, Decision::Approved, ExecutionOverrides::default())
            .await
            .unwrap();

        assert!(!decision.executed);
        assert!(decision.notes.as_deref().unwrap().contains("Market limit exceeded"));
        assert!(market.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn daily_throttle_refuses_after_limit() {
        let market = Arc::new(MockMarketClient::with_market("M", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "M");
        let strategy = strategy_with(0.70, 0.29, Arc::clone(&market), Arc::clone(&store));

        let signal = strategy.scan(None, false).await.unwrap().remove(0);
        // Burn today's budget with executed decisions.
        for _ in 0..TradingConfig::default().max_daily_trades {
            let mut spent = TradeDecision::unexecuted(signal.id, Decision::Approved, None);
            spent.executed = true;
            spent.executed_at = Some(Utc::now());
            store.insert_decision(&spent).unwrap();
        }

        let decision = strategy
            .execute(&signal, Decision::Approved, ExecutionOverrides::default())
            .await
            .unwrap();
        assert!(!decision.executed);
        assert!(decision
            .notes
            .as_deref()
            .unwrap()
            .contains("Daily trade limit reached"));
    }

    #[tokio::test]
    async fn monitor_exits_covers_open_positions() {
        let market = Arc::new(MockMarketClient::new());
        market.add_market("CONVERGED", 0.701, 0.30);
        market.add_market("DIVERGED", 0.55, 0.46);
        let store = test_store();
        for (id, quantity) in [("CONVERGED", 30), ("DIVERGED", 20)] {
            store
                .upsert_position(&PositionRecord {
                    market_id: id.to_string(),
                    option: id.to_string(),
                    side: Side::Yes,
                    quantity,
                    avg_price: 0.50,
                    unrealized_pnl: None,
                })
                .unwrap();
        }
        let strategy = strategy_with(0.70, 0.30, market, Arc::clone(&store));

        let exits = strategy.monitor_exits(false).await.unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].market_id, "CONVERGED");
        assert_eq!(exits[0].quantity, 30);
    }

    #[tokio::test]
    async fn performance_stats_aggregate_decisions() {
        let market = Arc::new(MockMarketClient::with_market("M", 0.45, 0.53));
        let store = test_store();
        track_market(&store, "M");
        let strategy = strategy_with(0.70, 0.29, market, Arc::clone(&store));

        let signal = strategy.scan(None, false).await.unwrap().remove(0);
        let mut win = TradeDecision::unexecuted(signal.id, Decision::Approved, None);
        win.executed = true;
        win.realized_pnl = Some(4.0);
        store.insert_decision(&win).unwrap();
        let mut loss = TradeDecision::unexecuted(signal.id, Decision::Approved, None);
        loss.executed = true;
        loss.realized_pnl = Some(-1.5);
        store.insert_decision(&loss).unwrap();
        store
            .insert_decision(&TradeDecision::unexecuted(signal.id, Decision::Ignored, None))
            .unwrap();

        let stats = strategy.performance_stats().unwrap();
        assert_eq!(stats.total_decisions, 3);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.closed_trades, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert!((stats.total_pnl - 2.5).abs() < 1e-9);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
    }
}
