use std::sync::Arc;

use chrono::Utc;
use oddsmith_models::config::{RiskConfig, TradingConfig};
use oddsmith_models::market::Side;
use oddsmith_models::signal::{SignalType, TradeAction, TradingSignal};
use oddsmith_store::{PositionRecord, Store};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::error::TradingError;
use crate::market::MarketClient;
use crate::risk;
use crate::sizing::{expected_profit, position_size};

/// Turns the gap between consensus belief and market price into sized,
/// risk-filtered entry and exit signals, persisting every signal it
/// emits.
#[derive(Clone)]
pub struct SignalGenerator {
    analyzer: Analyzer,
    market: Arc<dyn MarketClient>,
    store: Arc<Store>,
}

impl SignalGenerator {
    pub fn new(analyzer: Analyzer, market: Arc<dyn MarketClient>, store: Arc<Store>) -> Self {
        Self {
            analyzer,
            market,
            store,
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Entry signal for a market, or `None` when the edge is too small
    /// or the mispricing points the wrong way.
    pub async fn entry_signal(
        &self,
        market_id: &str,
        option: Option<&str>,
        trading: &TradingConfig,
        risk_config: &RiskConfig,
        force: bool,
    ) -> Result<Option<TradingSignal>, TradingError> {
        let outcome = self
            .analyzer
            .analyze(market_id, option, force, trading.cache_hours)
            .await?;
        let analysis = &outcome.analysis;
        let consensus_yes = analysis.consensus.yes_confidence;
        let consensus_no = analysis.consensus.no_confidence;

        let facts = self.market.market_facts(market_id).await?;
        let market_yes = self
            .market
            .mid_price(market_id, Side::Yes)
            .await?
            .unwrap_or(0.0);
        let market_no = self
            .market
            .mid_price(market_id, Side::No)
            .await?
            .unwrap_or(0.0);

        let divergence_yes = (consensus_yes - market_yes).abs();
        let divergence_no = (consensus_no - market_no).abs();

        if divergence_yes.max(divergence_no) < trading.entry_threshold {
            debug!(
                market = market_id,
                divergence_yes, divergence_no, "divergence below entry threshold"
            );
            return Ok(None);
        }

        // Buy the more-divergent side, but only when the consensus says
        // it is underpriced. Large divergence the other way is a reason
        // to stay out, not to trade.
        let (selected_side, action, price, target, magnitude) = if divergence_yes > divergence_no {
            if consensus_yes <= market_yes {
                debug!(market = market_id, "yes diverges most but is not underpriced");
                return Ok(None);
            }
            (Side::Yes, TradeAction::BuyYes, market_yes, consensus_yes, divergence_yes)
        } else {
            if consensus_no <= market_no {
                debug!(market = market_id, "no diverges most but is not underpriced");
                return Ok(None);
            }
            (Side::No, TradeAction::BuyNo, market_no, consensus_no, divergence_no)
        };

        let quantity = position_size(magnitude, trading);

        let mut signal = TradingSignal {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            market_id: market_id.to_string(),
            option: analysis.option.clone(),
            signal_type: SignalType::Entry,
            consensus_yes,
            consensus_no,
            market_yes,
            market_no,
            divergence_yes,
            divergence_no,
            selected_side: Some(selected_side),
            divergence_magnitude: magnitude,
            action,
            quantity,
            price,
            expected_profit: expected_profit(quantity, price, target),
            volume_24h: facts.volume_24h,
            liquidity: facts.liquidity,
            open_interest: facts.open_interest,
            analysis_id: Some(analysis.id),
            risk_warnings: vec![],
            passed_filters: true,
        };

        let (passed, warnings) = risk::apply_filters(&signal, &facts, risk_config);
        signal.passed_filters = passed;
        signal.risk_warnings = warnings;

        self.store.insert_signal(&signal)?;
        info!(
            market = market_id,
            side = %selected_side,
            quantity,
            magnitude,
            passed,
            "entry signal generated"
        );
        Ok(Some(signal))
    }

    /// Exit signal for an open position once the market has converged
    /// back to consensus. Full-quantity exits only.
    pub async fn exit_signal(
        &self,
        position: &PositionRecord,
        trading: &TradingConfig,
        force: bool,
    ) -> Result<Option<TradingSignal>, TradingError> {
        if position.quantity == 0 {
            return Ok(None);
        }

        let outcome = self
            .analyzer
            .analyze(
                &position.market_id,
                Some(&position.option),
                force,
                trading.cache_hours,
            )
            .await?;
        let analysis = &outcome.analysis;
        let consensus_yes = analysis.consensus.yes_confidence;
        let consensus_no = analysis.consensus.no_confidence;

        let market_yes = self
            .market
            .mid_price(&position.market_id, Side::Yes)
            .await?
            .unwrap_or(0.0);
        let market_no = self
            .market
            .mid_price(&position.market_id, Side::No)
            .await?
            .unwrap_or(0.0);

        let (current_price, consensus_price, action) = match position.side {
            Side::Yes => (market_yes, consensus_yes, TradeAction::SellYes),
            Side::No => (market_no, consensus_no, TradeAction::SellNo),
        };

        let current_divergence = (current_price - consensus_price).abs();
        if current_divergence > trading.exit_threshold {
            debug!(
                market = %position.market_id,
                current_divergence,
                "position has not converged; holding"
            );
            return Ok(None);
        }

        let signal = TradingSignal {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            market_id: position.market_id.clone(),
            option: position.option.clone(),
            signal_type: SignalType::Exit,
            consensus_yes,
            consensus_no,
            market_yes,
            market_no,
            divergence_yes: (consensus_yes - market_yes).abs(),
            divergence_no: (consensus_no - market_no).abs(),
            selected_side: Some(position.side),
            divergence_magnitude: current_divergence,
            action,
            quantity: position.quantity,
            price: current_price,
            expected_profit: expected_profit(position.quantity, position.avg_price, current_price),
            volume_24h: None,
            liquidity: None,
            open_interest: None,
            analysis_id: Some(analysis.id),
            risk_warnings: vec![],
            passed_filters: true,
        };

        self.store.insert_signal(&signal)?;
        info!(
            market = %position.market_id,
            quantity = position.quantity,
            expected_profit = signal.expected_profit,
            "exit signal generated"
        );
        Ok(Some(signal))
    }
}
