use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// Logical relationship class between two events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Causal,
    Correlated,
    Inverse,
    Independent,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Causal => "causal",
            DependencyKind::Correlated => "correlated",
            DependencyKind::Inverse => "inverse",
            DependencyKind::Independent => "independent",
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Implication,
    MutualExclusion,
    Conjunction,
}

/// A single logical constraint between two events. `description` is the
/// de-duplication key when constraints are merged across agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    #[serde(rename = "constraint_type")]
    pub kind: ConstraintKind,
    pub description: String,
    pub formal_expression: Option<String>,
    pub confidence: f64,
}

/// The pair of events under analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPair {
    pub a_ticker: String,
    pub a_title: String,
    pub a_category: Option<String>,
    pub b_ticker: String,
    pub b_title: String,
    pub b_category: Option<String>,
    pub same_series: bool,
}

/// One agent's dependency assessment for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyJudgment {
    pub score: f64,
    pub is_dependent: bool,
    #[serde(rename = "dependency_type")]
    pub kind: DependencyKind,
    pub constraints: Vec<Constraint>,
    pub reasoning: String,
    pub source: ProviderId,
}

/// Shift statistics on dependency scores between rounds, absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreConvergence {
    pub avg_shift: f64,
    pub max_shift: f64,
}

/// Aggregated dependency verdict across agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyConsensus {
    pub score: f64,
    pub is_dependent: bool,
    #[serde(rename = "dependency_type")]
    pub kind: DependencyKind,
    /// Union over agents, de-duplicated by description.
    pub constraints: Vec<Constraint>,
    pub agent_count: usize,
    pub judgments: BTreeMap<ProviderId, Option<DependencyJudgment>>,
    pub rounds_completed: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round1: Option<BTreeMap<ProviderId, DependencyJudgment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ScoreConvergence>,
}

/// Result of the cheap single-agent, titles-only pre-filter. Advisory
/// only: failures produce a zero-score independent result, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningResult {
    pub score: f64,
    pub is_dependent: bool,
    #[serde(rename = "dependency_type")]
    pub kind: DependencyKind,
    pub reasoning: String,
    pub source: ProviderId,
}
