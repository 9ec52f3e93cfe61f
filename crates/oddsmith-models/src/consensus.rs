use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::judgment::Judgment;
use crate::provider::ProviderId;

/// Aggregation policy for combining per-agent judgments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    SimpleAverage,
    WeightedAverage,
    IterativeReasoning,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusMethod::SimpleAverage => "simple_average",
            ConsensusMethod::WeightedAverage => "weighted_average",
            ConsensusMethod::IterativeReasoning => "iterative_reasoning",
        }
    }
}

impl std::fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsensusMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple_average" => Ok(ConsensusMethod::SimpleAverage),
            "weighted_average" => Ok(ConsensusMethod::WeightedAverage),
            "iterative_reasoning" => Ok(ConsensusMethod::IterativeReasoning),
            other => Err(format!("unknown consensus method: {other}")),
        }
    }
}

/// How much individual agents moved between round 1 and round 2.
///
/// Averages are signed means of (round 2 − round 1); maxima are the
/// largest absolute shifts. Computed only over agents present in both
/// rounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConvergenceMetrics {
    pub avg_yes_shift: f64,
    pub avg_no_shift: f64,
    pub max_yes_shift: f64,
    pub max_no_shift: f64,
}

/// The combined belief produced by one consensus run.
///
/// `yes_confidence` / `no_confidence` are always the (possibly weighted)
/// mean over judgments actually present; absent agents contribute
/// nothing and do not count in the denominator, and
/// `agent_count == judgments.values().filter(Some).count()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusResult {
    pub yes_confidence: f64,
    pub no_confidence: f64,
    pub method: ConsensusMethod,
    pub agent_count: usize,
    /// Final-round outcome per registered agent; `None` marks absence.
    pub judgments: BTreeMap<ProviderId, Option<Judgment>>,
    pub rounds_completed: u8,
    /// Round-1 judgments, echoed when the iterative protocol ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round1: Option<BTreeMap<ProviderId, Judgment>>,
    /// Absent when round 2 did not complete or no agent was present in
    /// both rounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceMetrics>,
}

impl ConsensusResult {
    /// Providers whose final-round judgment is present.
    pub fn present(&self) -> impl Iterator<Item = (&ProviderId, &Judgment)> {
        self.judgments
            .iter()
            .filter_map(|(id, j)| j.as_ref().map(|j| (id, j)))
    }

    /// Providers that ended the run absent.
    pub fn absent(&self) -> Vec<ProviderId> {
        self.judgments
            .iter()
            .filter(|(_, j)| j.is_none())
            .map(|(id, _)| *id)
            .collect()
    }
}
