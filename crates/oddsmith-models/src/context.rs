use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::judgment::{Judgment, PeerJudgment};
use crate::market::Side;

/// A prior analysis summarized for inclusion in a snapshot's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisDigest {
    pub analyzed_at: DateTime<Utc>,
    pub yes_confidence: f64,
    pub no_confidence: f64,
}

/// The caller's open position in the market, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionFacts {
    pub side: Side,
    pub quantity: i64,
    pub avg_price: f64,
    pub unrealized_pnl: Option<f64>,
}

/// Read-only bundle assembled once per analysis and handed to every
/// agent in a round. Round-2 variants are built from clones; a snapshot
/// is never mutated after an agent has seen it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub title: String,
    pub status: Option<String>,
    pub close_time: Option<DateTime<Utc>>,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub open_interest: Option<i64>,
    pub position: Option<PositionFacts>,
    /// Most-recent-first, bounded by the assembler.
    pub history: Vec<AnalysisDigest>,
}

/// What an agent is asked to judge: the bare snapshot in round 1, or the
/// snapshot plus its own prior judgment and anonymized peer judgments in
/// round 2.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "round", rename_all = "snake_case")]
pub enum AnalysisContext {
    Plain(MarketSnapshot),
    PeerFed {
        snapshot: MarketSnapshot,
        own_prior: Judgment,
        peers: Vec<PeerJudgment>,
    },
}

impl AnalysisContext {
    pub fn snapshot(&self) -> &MarketSnapshot {
        match self {
            AnalysisContext::Plain(snapshot) => snapshot,
            AnalysisContext::PeerFed { snapshot, .. } => snapshot,
        }
    }

    pub fn is_peer_fed(&self) -> bool {
        matches!(self, AnalysisContext::PeerFed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    pub(crate) fn sample_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            market_id: "TURNOUT-60".to_string(),
            title: "Will turnout exceed 60%?".to_string(),
            status: Some("open".to_string()),
            close_time: None,
            yes_price: Some(0.55),
            no_price: Some(0.46),
            volume_24h: Some(820.0),
            liquidity: Some(310.0),
            open_interest: Some(1500),
            position: None,
            history: vec![AnalysisDigest {
                analyzed_at: Utc::now(),
                yes_confidence: 0.58,
                no_confidence: 0.40,
            }],
        }
    }

    #[test]
    fn snapshot_accessor_covers_both_variants() {
        let plain = AnalysisContext::Plain(sample_snapshot());
        assert_eq!(plain.snapshot().market_id, "TURNOUT-60");
        assert!(!plain.is_peer_fed());

        let fed = AnalysisContext::PeerFed {
            snapshot: sample_snapshot(),
            own_prior: Judgment {
                yes_confidence: 0.6,
                no_confidence: 0.4,
                reasoning: "prior".to_string(),
                source: ProviderId::Openai,
            },
            peers: vec![PeerJudgment {
                label: "Analyst A".to_string(),
                yes_confidence: 0.7,
                no_confidence: 0.3,
                reasoning: "peer".to_string(),
            }],
        };
        assert_eq!(fed.snapshot().market_id, "TURNOUT-60");
        assert!(fed.is_peer_fed());
    }

    #[test]
    fn roundtrip_peer_fed_context() {
        let fed = AnalysisContext::PeerFed {
            snapshot: sample_snapshot(),
            own_prior: Judgment {
                yes_confidence: 0.6,
                no_confidence: 0.4,
                reasoning: "prior".to_string(),
                source: ProviderId::Grok,
            },
            peers: vec![],
        };
        let json = serde_json::to_string(&fed).unwrap();
        let parsed: AnalysisContext = serde_json::from_str(&json).unwrap();
        assert_eq!(fed, parsed);
    }
}
