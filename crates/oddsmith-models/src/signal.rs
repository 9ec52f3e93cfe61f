use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::Side;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Entry,
    Exit,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Entry => "entry",
            SignalType::Exit => "exit",
        }
    }
}

/// The concrete trade the signal recommends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    BuyYes,
    BuyNo,
    SellYes,
    SellNo,
}

impl TradeAction {
    pub fn side(&self) -> Side {
        match self {
            TradeAction::BuyYes | TradeAction::SellYes => Side::Yes,
            TradeAction::BuyNo | TradeAction::SellNo => Side::No,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, TradeAction::BuyYes | TradeAction::BuyNo)
    }
}

/// A sized, risk-filtered trade recommendation derived from the gap
/// between consensus belief and observed market price. Immutable once
/// created; decisions reference it by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingSignal {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub market_id: String,
    pub option: String,
    pub signal_type: SignalType,

    pub consensus_yes: f64,
    pub consensus_no: f64,
    pub market_yes: f64,
    pub market_no: f64,

    pub divergence_yes: f64,
    pub divergence_no: f64,
    pub selected_side: Option<Side>,
    pub divergence_magnitude: f64,

    pub action: TradeAction,
    pub quantity: i64,
    pub price: f64,
    pub expected_profit: f64,

    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub open_interest: Option<i64>,
    /// Row id of the stored analysis this signal was derived from.
    pub analysis_id: Option<i64>,

    pub risk_warnings: Vec<String>,
    pub passed_filters: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    Ignored,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::Ignored => "ignored",
        }
    }
}

/// The human (or automation) verdict on a signal, appended once at
/// approval time together with execution details if an order went out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeDecision {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub signal_id: Uuid,
    pub decision: Decision,
    pub notes: Option<String>,

    pub executed: bool,
    pub executed_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub actual_quantity: Option<i64>,
    pub actual_price: Option<f64>,
    pub execution_cost: Option<f64>,
    pub realized_pnl: Option<f64>,
}

impl TradeDecision {
    /// A decision record with no execution details yet.
    pub fn unexecuted(signal_id: Uuid, decision: Decision, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            signal_id,
            decision,
            notes,
            executed: false,
            executed_at: None,
            order_id: None,
            actual_quantity: None,
            actual_price: None,
            execution_cost: None,
            realized_pnl: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_signal() -> TradingSignal {
        TradingSignal {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            market_id: "TURNOUT-60".to_string(),
            option: "TURNOUT-60".to_string(),
            signal_type: SignalType::Entry,
            consensus_yes: 0.72,
            consensus_no: 0.26,
            market_yes: 0.55,
            market_no: 0.46,
            divergence_yes: 0.17,
            divergence_no: 0.20,
            selected_side: Some(Side::Yes),
            divergence_magnitude: 0.17,
            action: TradeAction::BuyYes,
            quantity: 62,
            price: 0.55,
            expected_profit: 10.54,
            volume_24h: Some(820.0),
            liquidity: Some(310.0),
            open_interest: Some(1500),
            analysis_id: Some(7),
            risk_warnings: vec![],
            passed_filters: true,
        }
    }

    #[test]
    fn action_side_and_direction() {
        assert_eq!(TradeAction::BuyYes.side(), Side::Yes);
        assert_eq!(TradeAction::SellNo.side(), Side::No);
        assert!(TradeAction::BuyNo.is_buy());
        assert!(!TradeAction::SellYes.is_buy());
    }

    #[test]
    fn roundtrip_trading_signal() {
        let signal = sample_signal();
        let json = serde_json::to_string(&signal).unwrap();
        let parsed: TradingSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(signal, parsed);
        // bitwise, not approximate
        assert!(signal.divergence_magnitude == parsed.divergence_magnitude);
    }

    #[test]
    fn roundtrip_trade_decision() {
        let decision = TradeDecision {
            executed: true,
            executed_at: Some(Utc::now()),
            order_id: Some("ord-123".to_string()),
            actual_quantity: Some(62),
            actual_price: Some(0.55),
            execution_cost: Some(34.10),
            realized_pnl: None,
            ..TradeDecision::unexecuted(Uuid::new_v4(), Decision::Approved, None)
        };
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: TradeDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, parsed);
    }

    #[test]
    fn enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&TradeAction::BuyYes).unwrap(),
            "\"buy_yes\""
        );
        assert_eq!(serde_json::to_string(&SignalType::Exit).unwrap(), "\"exit\"");
        assert_eq!(
            serde_json::to_string(&Decision::Ignored).unwrap(),
            "\"ignored\""
        );
    }
}
