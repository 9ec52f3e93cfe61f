use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// One estimator's output for one round.
///
/// Confidences are independent probabilities in [0, 1]; they are not
/// required to sum to 1. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Judgment {
    pub yes_confidence: f64,
    pub no_confidence: f64,
    pub reasoning: String,
    pub source: ProviderId,
}

/// What came back from one agent for one round: a judgment, or an
/// explicit absence with the reason it was dropped.
///
/// Transport, parse and policy failures all land in `Absent`; they never
/// cross the gateway boundary as errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentOutcome {
    Judged(Judgment),
    Absent { reason: String },
}

impl AgentOutcome {
    pub fn judgment(&self) -> Option<&Judgment> {
        match self {
            AgentOutcome::Judged(j) => Some(j),
            AgentOutcome::Absent { .. } => None,
        }
    }

    pub fn into_judgment(self) -> Option<Judgment> {
        match self {
            AgentOutcome::Judged(j) => Some(j),
            AgentOutcome::Absent { .. } => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, AgentOutcome::Absent { .. })
    }
}

/// A peer's round-1 judgment as shown to another agent in round 2,
/// identified only by an anonymous label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerJudgment {
    pub label: String,
    pub yes_confidence: f64,
    pub no_confidence: f64,
    pub reasoning: String,
}
