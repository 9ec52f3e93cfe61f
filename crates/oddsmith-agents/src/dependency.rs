use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use oddsmith_models::dependency::{
    Constraint, DependencyConsensus, DependencyJudgment, DependencyKind, EventPair,
    ScoreConvergence, ScreeningResult,
};
use oddsmith_models::provider::ProviderId;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use crate::consensus::ANALYST_LABELS;
use crate::error::{AgentError, ConsensusError};
use crate::gateway::EstimatorAgent;
use crate::parser::parse_dependency;
use crate::prompts::{
    dependency_prompt, dependency_revision_prompt, screening_prompt, DependencyPeer,
};

/// Two-round consensus applied to a pair of events instead of a single
/// market: does A's outcome constrain B's?
pub struct DependencyDetector {
    agents: BTreeMap<ProviderId, Arc<dyn EstimatorAgent>>,
    screening: ProviderId,
}

impl DependencyDetector {
    pub fn new(agents: Vec<Arc<dyn EstimatorAgent>>, screening: ProviderId) -> Self {
        let agents = agents
            .into_iter()
            .map(|agent| (agent.provider(), agent))
            .collect();
        Self { agents, screening }
    }

    /// Full two-round dependency analysis. Round 2 feeds each survivor
    /// the other survivors' score, type and reasoning (constraints are
    /// not peer-fed) under per-recipient shuffled anonymous labels.
    pub async fn analyze(&self, pair: &EventPair) -> Result<DependencyConsensus, ConsensusError> {
        if self.agents.is_empty() {
            return Err(ConsensusError::Validation(
                "no estimator agents registered".to_string(),
            ));
        }

        info!(
            a = %pair.a_ticker,
            b = %pair.b_ticker,
            agents = self.agents.len(),
            "starting dependency round 1"
        );
        let prompt = dependency_prompt(pair);
        let round1 = self
            .round(self.agents.keys().map(|id| (*id, prompt.clone())).collect())
            .await;
        let survivors: BTreeMap<ProviderId, DependencyJudgment> = round1
            .iter()
            .filter_map(|(id, judgment)| judgment.clone().map(|j| (*id, j)))
            .collect();

        if survivors.is_empty() {
            return Err(ConsensusError::QuorumExhausted {
                attempted: self.agents.keys().copied().collect(),
            });
        }

        let round2_prompts = revision_prompts(pair, &survivors);
        info!(agents = round2_prompts.len(), "starting dependency round 2 with peer feedback");
        let round2 = self.round(round2_prompts).await;
        let round2_present: BTreeMap<ProviderId, DependencyJudgment> = round2
            .iter()
            .filter_map(|(id, judgment)| judgment.clone().map(|j| (*id, j)))
            .collect();

        if round2_present.is_empty() {
            warn!("dependency round 2 produced no judgments; falling back to round 1");
            let mut result = aggregate(&round1, self.agents.keys().copied());
            result.rounds_completed = 1;
            result.round1 = Some(survivors);
            return Ok(result);
        }

        // Final map over every registered agent, round-2 outcomes where
        // present.
        let mut final_map: BTreeMap<ProviderId, Option<DependencyJudgment>> =
            self.agents.keys().map(|id| (*id, None)).collect();
        for (id, judgment) in &round2 {
            final_map.insert(*id, judgment.clone());
        }

        let mut result = aggregate(&final_map, self.agents.keys().copied());
        result.rounds_completed = 2;
        result.convergence = score_convergence(&survivors, &round2_present);
        result.round1 = Some(survivors);
        Ok(result)
    }

    /// Cheap pre-filter: one provider, titles only, one round. Failures
    /// yield a zero-score independent result because callers treat
    /// screening as advisory.
    pub async fn screen(&self, pair: &EventPair) -> ScreeningResult {
        match self.try_screen(pair).await {
            Ok(result) => result,
            Err(error) => {
                warn!(provider = %self.screening, %error, "screening failed; returning zero score");
                ScreeningResult {
                    score: 0.0,
                    is_dependent: false,
                    kind: DependencyKind::Independent,
                    reasoning: format!("Screening failed: {error}"),
                    source: self.screening,
                }
            }
        }
    }

    async fn try_screen(&self, pair: &EventPair) -> Result<ScreeningResult, AgentError> {
        let agent = self.agents.get(&self.screening).ok_or_else(|| {
            AgentError::Http(format!("screening provider {} not registered", self.screening))
        })?;
        let raw = agent.freeform(&screening_prompt(pair)).await?;
        let judgment = parse_dependency(&raw, self.screening)?;
        Ok(ScreeningResult {
            score: judgment.score,
            is_dependent: judgment.is_dependent,
            kind: judgment.kind,
            reasoning: judgment.reasoning,
            source: self.screening,
        })
    }

    /// One wave of freeform calls, each parsed into a dependency
    /// judgment. Failures are logged and recorded as `None`.
    async fn round(
        &self,
        prompts: BTreeMap<ProviderId, String>,
    ) -> BTreeMap<ProviderId, Option<DependencyJudgment>> {
        let mut handles = Vec::new();
        for (id, prompt) in prompts {
            let agent = match self.agents.get(&id) {
                Some(agent) => Arc::clone(agent),
                None => continue,
            };
            handles.push((
                id,
                tokio::spawn(async move {
                    let start = Instant::now();
                    let result = agent.freeform(&prompt).await;
                    (result, start.elapsed())
                }),
            ));
        }

        let mut outcomes = BTreeMap::new();
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok((Ok(raw), elapsed)) => match parse_dependency(&raw, id) {
                    Ok(judgment) => {
                        info!(
                            provider = %id,
                            score = judgment.score,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "dependency judgment received"
                        );
                        Some(judgment)
                    }
                    Err(parse_error) => {
                        warn!(provider = %id, error = %parse_error, "unparseable dependency response");
                        None
                    }
                },
                Ok((Err(agent_error), elapsed)) => {
                    warn!(
                        provider = %id,
                        error = %agent_error,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "dependency call failed"
                    );
                    None
                }
                Err(join_error) => {
                    error!(provider = %id, error = %join_error, "dependency task panicked");
                    None
                }
            };
            outcomes.insert(id, outcome);
        }
        outcomes
    }
}

fn revision_prompts(
    pair: &EventPair,
    survivors: &BTreeMap<ProviderId, DependencyJudgment>,
) -> BTreeMap<ProviderId, String> {
    let mut rng = rand::thread_rng();
    survivors
        .iter()
        .map(|(id, own)| {
            let mut peers: Vec<&DependencyJudgment> = survivors
                .iter()
                .filter(|(peer_id, _)| *peer_id != id)
                .map(|(_, judgment)| judgment)
                .collect();
            peers.shuffle(&mut rng);
            let peers: Vec<DependencyPeer> = peers
                .into_iter()
                .enumerate()
                .map(|(i, judgment)| DependencyPeer {
                    label: ANALYST_LABELS[i % ANALYST_LABELS.len()].to_string(),
                    score: judgment.score,
                    is_dependent: judgment.is_dependent,
                    kind: judgment.kind,
                    reasoning: judgment.reasoning.clone(),
                })
                .collect();
            (*id, dependency_revision_prompt(pair, &peers, own))
        })
        .collect()
}

/// Mean score, threshold at 0.5, plurality type with first-encountered
/// tiebreak, constraints unioned and de-duplicated by description.
fn aggregate(
    judgments: &BTreeMap<ProviderId, Option<DependencyJudgment>>,
    registered: impl Iterator<Item = ProviderId>,
) -> DependencyConsensus {
    let mut full_map: BTreeMap<ProviderId, Option<DependencyJudgment>> =
        registered.map(|id| (id, None)).collect();
    for (id, judgment) in judgments {
        full_map.insert(*id, judgment.clone());
    }

    let present: Vec<&DependencyJudgment> =
        full_map.values().filter_map(|j| j.as_ref()).collect();
    debug_assert!(!present.is_empty(), "aggregate called with no judgments");

    let score = present.iter().map(|j| j.score).sum::<f64>() / present.len() as f64;

    let mut constraints: Vec<Constraint> = Vec::new();
    for judgment in &present {
        for constraint in &judgment.constraints {
            if !constraints
                .iter()
                .any(|seen| seen.description == constraint.description)
            {
                constraints.push(constraint.clone());
            }
        }
    }

    DependencyConsensus {
        score,
        is_dependent: score >= 0.5,
        kind: plurality_kind(&present),
        constraints,
        agent_count: present.len(),
        judgments: full_map,
        rounds_completed: 1,
        round1: None,
        convergence: None,
    }
}

fn plurality_kind(judgments: &[&DependencyJudgment]) -> DependencyKind {
    let mut counts: Vec<(DependencyKind, usize)> = Vec::new();
    for judgment in judgments {
        match counts.iter_mut().find(|(kind, _)| *kind == judgment.kind) {
            Some(entry) => entry.1 += 1,
            None => counts.push((judgment.kind, 1)),
        }
    }
    let mut best = match counts.first() {
        Some(first) => *first,
        None => return DependencyKind::Independent,
    };
    for candidate in &counts[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best.0
}

/// Absolute score shifts between rounds over the intersection.
fn score_convergence(
    round1: &BTreeMap<ProviderId, DependencyJudgment>,
    round2: &BTreeMap<ProviderId, DependencyJudgment>,
) -> Option<ScoreConvergence> {
    let shifts: Vec<f64> = round2
        .iter()
        .filter_map(|(id, second)| round1.get(id).map(|first| (second.score - first.score).abs()))
        .collect();
    if shifts.is_empty() {
        return None;
    }
    Some(ScoreConvergence {
        avg_shift: shifts.iter().sum::<f64>() / shifts.len() as f64,
        max_shift: shifts.iter().fold(0.0f64, |a, &b| a.max(b)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsmith_models::dependency::ConstraintKind;

    fn judgment(source: ProviderId, score: f64, kind: DependencyKind) -> DependencyJudgment {
        DependencyJudgment {
            score,
            is_dependent: score >= 0.5,
            kind,
            constraints: vec![],
            reasoning: "test".to_string(),
            source,
        }
    }

    fn constraint(description: &str) -> Constraint {
        Constraint {
            kind: ConstraintKind::Implication,
            description: description.to_string(),
            formal_expression: Some("A => B".to_string()),
            confidence: 0.8,
        }
    }

    #[test]
    fn aggregate_means_scores_and_thresholds() {
        let judgments: BTreeMap<ProviderId, Option<DependencyJudgment>> = [
            (
                ProviderId::Claude,
                Some(judgment(ProviderId::Claude, 0.6, DependencyKind::Causal)),
            ),
            (
                ProviderId::Openai,
                Some(judgment(ProviderId::Openai, 0.5, DependencyKind::Causal)),
            ),
        ]
        .into_iter()
        .collect();

        let result = aggregate(&judgments, judgments.keys().copied());
        assert!((result.score - 0.55).abs() < 1e-12);
        assert!(result.is_dependent);
        assert_eq!(result.kind, DependencyKind::Causal);
        assert_eq!(result.agent_count, 2);
    }

    #[test]
    fn identical_constraint_descriptions_collapse() {
        let mut first = judgment(ProviderId::Claude, 0.8, DependencyKind::Causal);
        first.constraints = vec![constraint("A implies B")];
        let mut second = judgment(ProviderId::Openai, 0.7, DependencyKind::Causal);
        second.constraints = vec![constraint("A implies B"), constraint("B blocks C")];

        let judgments: BTreeMap<ProviderId, Option<DependencyJudgment>> = [
            (ProviderId::Claude, Some(first)),
            (ProviderId::Openai, Some(second)),
        ]
        .into_iter()
        .collect();

        let result = aggregate(&judgments, judgments.keys().copied());
        assert_eq!(result.constraints.len(), 2);
        assert_eq!(result.constraints[0].description, "A implies B");
        assert_eq!(result.constraints[1].description, "B blocks C");
    }

    #[test]
    fn plurality_prefers_first_encountered_on_ties() {
        let judgments = [
            judgment(ProviderId::Claude, 0.6, DependencyKind::Correlated),
            judgment(ProviderId::Openai, 0.6, DependencyKind::Causal),
            judgment(ProviderId::Grok, 0.6, DependencyKind::Causal),
            judgment(ProviderId::Gemini, 0.6, DependencyKind::Correlated),
        ];
        let refs: Vec<&DependencyJudgment> = judgments.iter().collect();
        // 2-2 tie; Correlated was seen first.
        assert_eq!(plurality_kind(&refs), DependencyKind::Correlated);
    }

    #[test]
    fn score_convergence_absolute_shifts() {
        let round1: BTreeMap<ProviderId, DependencyJudgment> = [
            (
                ProviderId::Claude,
                judgment(ProviderId::Claude, 0.60, DependencyKind::Causal),
            ),
            (
                ProviderId::Openai,
                judgment(ProviderId::Openai, 0.80, DependencyKind::Causal),
            ),
        ]
        .into_iter()
        .collect();
        let round2: BTreeMap<ProviderId, DependencyJudgment> = [
            (
                ProviderId::Claude,
                judgment(ProviderId::Claude, 0.70, DependencyKind::Causal),
            ),
            (
                ProviderId::Openai,
                judgment(ProviderId::Openai, 0.75, DependencyKind::Causal),
            ),
        ]
        .into_iter()
        .collect();

        let metrics = score_convergence(&round1, &round2).unwrap();
        assert!((metrics.avg_shift - 0.075).abs() < 1e-12);
        assert!((metrics.max_shift - 0.10).abs() < 1e-12);
    }
}
