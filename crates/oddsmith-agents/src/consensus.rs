use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use oddsmith_models::consensus::{ConsensusMethod, ConsensusResult, ConvergenceMetrics};
use oddsmith_models::context::{AnalysisContext, MarketSnapshot};
use oddsmith_models::judgment::{AgentOutcome, Judgment, PeerJudgment};
use oddsmith_models::provider::ProviderId;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use crate::error::ConsensusError;
use crate::gateway::{settle_judge, EstimatorAgent};

/// Fixed pool of anonymous labels for peer feedback. Labels are assigned
/// in pool order to a peer list that is shuffled independently per
/// recipient, so no agent can infer which provider said what from
/// position.
pub(crate) const ANALYST_LABELS: [&str; 8] = [
    "Analyst A",
    "Analyst B",
    "Analyst C",
    "Analyst D",
    "Analyst E",
    "Analyst F",
    "Analyst G",
    "Analyst H",
];

/// Orchestrates rounds of concurrent estimator queries and combines the
/// surviving judgments into a single [`ConsensusResult`].
pub struct ConsensusEngine {
    agents: BTreeMap<ProviderId, Arc<dyn EstimatorAgent>>,
    weights: BTreeMap<ProviderId, f64>,
}

impl ConsensusEngine {
    pub fn new(agents: Vec<Arc<dyn EstimatorAgent>>) -> Self {
        let agents = agents
            .into_iter()
            .map(|agent| (agent.provider(), agent))
            .collect();
        Self {
            agents,
            weights: BTreeMap::new(),
        }
    }

    /// Per-agent weights for the weighted-average method. Providers not
    /// in the map default to 1.0.
    pub fn with_weights(mut self, weights: BTreeMap<ProviderId, f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.agents.keys().copied().collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Run one full consensus for `snapshot` under `method`.
    ///
    /// Fails with `QuorumExhausted` if round 1 produces zero judgments;
    /// a fully failed round 2 degrades to the round-1 result instead of
    /// failing.
    pub async fn run(
        &self,
        snapshot: &MarketSnapshot,
        method: ConsensusMethod,
    ) -> Result<ConsensusResult, ConsensusError> {
        if self.agents.is_empty() {
            return Err(ConsensusError::Validation(
                "no estimator agents registered".to_string(),
            ));
        }

        info!(
            market = %snapshot.market_id,
            %method,
            agents = self.agents.len(),
            "starting consensus round 1"
        );
        let contexts = self
            .agents
            .keys()
            .map(|id| (*id, AnalysisContext::Plain(snapshot.clone())))
            .collect();
        let round1 = self.round(contexts).await;
        let round1_map = outcomes_to_options(&round1);
        let survivors = present_judgments(&round1_map);

        if survivors.is_empty() {
            return Err(ConsensusError::QuorumExhausted {
                attempted: self.providers(),
            });
        }

        match method {
            ConsensusMethod::SimpleAverage => simple_average(&round1_map),
            ConsensusMethod::WeightedAverage => weighted_average(&round1_map, &self.weights),
            ConsensusMethod::IterativeReasoning => {
                self.revise(snapshot, round1_map, survivors).await
            }
        }
    }

    /// Round 2 of the iterative protocol: survivors only, each fed its
    /// own prior plus the others' judgments under anonymous labels.
    async fn revise(
        &self,
        snapshot: &MarketSnapshot,
        round1_map: BTreeMap<ProviderId, Option<Judgment>>,
        survivors: BTreeMap<ProviderId, Judgment>,
    ) -> Result<ConsensusResult, ConsensusError> {
        let contexts = peer_fed_contexts(snapshot, &survivors);
        info!(agents = contexts.len(), "starting consensus round 2 with peer feedback");
        let round2 = self.round(contexts).await;
        let round2_present = present_judgments(&outcomes_to_options(&round2));

        if round2_present.is_empty() {
            warn!(
                market = %snapshot.market_id,
                "round 2 produced no judgments; falling back to round-1 consensus"
            );
            let mut result = simple_average(&round1_map)?;
            result.method = ConsensusMethod::IterativeReasoning;
            result.rounds_completed = 1;
            result.round1 = Some(survivors);
            return Ok(result);
        }

        // Final map spans every registered agent: round-2 outcomes for
        // survivors, None for agents that never judged.
        let mut final_map: BTreeMap<ProviderId, Option<Judgment>> =
            self.agents.keys().map(|id| (*id, None)).collect();
        for (id, outcome) in &round2 {
            final_map.insert(*id, outcome.judgment().cloned());
        }

        let mut result = simple_average(&final_map)?;
        result.method = ConsensusMethod::IterativeReasoning;
        result.rounds_completed = 2;
        result.convergence = convergence(&survivors, &round2_present);
        result.round1 = Some(survivors);
        Ok(result)
    }

    /// One synchronized wave of concurrent agent calls. Waits for every
    /// branch to settle; a panicked task is recorded as an absence so
    /// the outcome map always covers the dispatched set.
    async fn round(
        &self,
        contexts: BTreeMap<ProviderId, AnalysisContext>,
    ) -> BTreeMap<ProviderId, AgentOutcome> {
        let mut handles = Vec::new();
        for (id, context) in contexts {
            let agent = match self.agents.get(&id) {
                Some(agent) => Arc::clone(agent),
                None => continue,
            };
            handles.push((
                id,
                tokio::spawn(async move {
                    let start = Instant::now();
                    let outcome = settle_judge(agent.as_ref(), &context).await;
                    (outcome, start.elapsed())
                }),
            ));
        }

        let mut outcomes = BTreeMap::new();
        for (id, handle) in handles {
            match handle.await {
                Ok((outcome, elapsed)) => {
                    match &outcome {
                        AgentOutcome::Judged(judgment) => info!(
                            provider = %id,
                            yes = judgment.yes_confidence,
                            no = judgment.no_confidence,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "judgment received"
                        ),
                        AgentOutcome::Absent { reason } => warn!(
                            provider = %id,
                            %reason,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "no judgment"
                        ),
                    }
                    outcomes.insert(id, outcome);
                }
                Err(join_error) => {
                    error!(provider = %id, error = %join_error, "agent task panicked");
                    outcomes.insert(
                        id,
                        AgentOutcome::Absent {
                            reason: format!("task failure: {join_error}"),
                        },
                    );
                }
            }
        }
        outcomes
    }
}

/// Arithmetic mean over present judgments.
pub fn simple_average(
    judgments: &BTreeMap<ProviderId, Option<Judgment>>,
) -> Result<ConsensusResult, ConsensusError> {
    aggregate(judgments, None)
}

/// Weighted mean over present judgments; missing weights default to 1.0.
pub fn weighted_average(
    judgments: &BTreeMap<ProviderId, Option<Judgment>>,
    weights: &BTreeMap<ProviderId, f64>,
) -> Result<ConsensusResult, ConsensusError> {
    aggregate(judgments, Some(weights))
}

fn aggregate(
    judgments: &BTreeMap<ProviderId, Option<Judgment>>,
    weights: Option<&BTreeMap<ProviderId, f64>>,
) -> Result<ConsensusResult, ConsensusError> {
    let present: Vec<(ProviderId, &Judgment)> = judgments
        .iter()
        .filter_map(|(id, judgment)| judgment.as_ref().map(|j| (*id, j)))
        .collect();

    if present.is_empty() {
        return Err(ConsensusError::QuorumExhausted {
            attempted: judgments.keys().copied().collect(),
        });
    }

    let (yes_confidence, no_confidence, method) = match weights {
        None => {
            let n = present.len() as f64;
            let yes = present.iter().map(|(_, j)| j.yes_confidence).sum::<f64>() / n;
            let no = present.iter().map(|(_, j)| j.no_confidence).sum::<f64>() / n;
            (yes, no, ConsensusMethod::SimpleAverage)
        }
        Some(weights) => {
            let weight_of = |id: &ProviderId| weights.get(id).copied().unwrap_or(1.0);
            let total: f64 = present.iter().map(|(id, _)| weight_of(id)).sum();
            if total == 0.0 {
                return Err(ConsensusError::Validation("total weight is zero".to_string()));
            }
            let yes = present
                .iter()
                .map(|(id, j)| j.yes_confidence * weight_of(id))
                .sum::<f64>()
                / total;
            let no = present
                .iter()
                .map(|(id, j)| j.no_confidence * weight_of(id))
                .sum::<f64>()
                / total;
            (yes, no, ConsensusMethod::WeightedAverage)
        }
    };

    Ok(ConsensusResult {
        yes_confidence,
        no_confidence,
        method,
        agent_count: present.len(),
        judgments: judgments.clone(),
        rounds_completed: 1,
        round1: None,
        convergence: None,
    })
}

fn outcomes_to_options(
    outcomes: &BTreeMap<ProviderId, AgentOutcome>,
) -> BTreeMap<ProviderId, Option<Judgment>> {
    outcomes
        .iter()
        .map(|(id, outcome)| (*id, outcome.judgment().cloned()))
        .collect()
}

fn present_judgments(
    judgments: &BTreeMap<ProviderId, Option<Judgment>>,
) -> BTreeMap<ProviderId, Judgment> {
    judgments
        .iter()
        .filter_map(|(id, judgment)| judgment.clone().map(|j| (*id, j)))
        .collect()
}

/// Build the per-recipient round-2 contexts. Each survivor sees its own
/// prior and the other survivors' judgments; peer order is shuffled
/// independently for every recipient before labels are assigned.
fn peer_fed_contexts(
    snapshot: &MarketSnapshot,
    survivors: &BTreeMap<ProviderId, Judgment>,
) -> BTreeMap<ProviderId, AnalysisContext> {
    let mut rng = rand::thread_rng();
    survivors
        .iter()
        .map(|(id, own)| {
            let mut peers: Vec<&Judgment> = survivors
                .iter()
                .filter(|(peer_id, _)| *peer_id != id)
                .map(|(_, judgment)| judgment)
                .collect();
            peers.shuffle(&mut rng);
            let peers = peers
                .into_iter()
                .enumerate()
                .map(|(i, judgment)| PeerJudgment {
                    label: ANALYST_LABELS[i % ANALYST_LABELS.len()].to_string(),
                    yes_confidence: judgment.yes_confidence,
                    no_confidence: judgment.no_confidence,
                    reasoning: judgment.reasoning.clone(),
                })
                .collect();
            (
                *id,
                AnalysisContext::PeerFed {
                    snapshot: snapshot.clone(),
                    own_prior: own.clone(),
                    peers,
                },
            )
        })
        .collect()
}

/// Signed mean and max-absolute shift between rounds, over the agents
/// present in both. None if the intersection is empty.
fn convergence(
    round1: &BTreeMap<ProviderId, Judgment>,
    round2: &BTreeMap<ProviderId, Judgment>,
) -> Option<ConvergenceMetrics> {
    let shifts: Vec<(f64, f64)> = round2
        .iter()
        .filter_map(|(id, second)| {
            round1.get(id).map(|first| {
                (
                    second.yes_confidence - first.yes_confidence,
                    second.no_confidence - first.no_confidence,
                )
            })
        })
        .collect();

    if shifts.is_empty() {
        return None;
    }
    let n = shifts.len() as f64;
    Some(ConvergenceMetrics {
        avg_yes_shift: shifts.iter().map(|(yes, _)| yes).sum::<f64>() / n,
        avg_no_shift: shifts.iter().map(|(_, no)| no).sum::<f64>() / n,
        max_yes_shift: shifts.iter().map(|(yes, _)| yes.abs()).fold(0.0, f64::max),
        max_no_shift: shifts.iter().map(|(_, no)| no.abs()).fold(0.0, f64::max),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judgment(source: ProviderId, yes: f64, no: f64) -> Judgment {
        Judgment {
            yes_confidence: yes,
            no_confidence: no,
            reasoning: format!("{source} reasoning"),
            source,
        }
    }

    fn judgment_map(entries: Vec<(ProviderId, Option<(f64, f64)>)>) -> BTreeMap<ProviderId, Option<Judgment>> {
        entries
            .into_iter()
            .map(|(id, confidences)| {
                (id, confidences.map(|(yes, no)| judgment(id, yes, no)))
            })
            .collect()
    }

    #[test]
    fn simple_average_ignores_absent_agents() {
        let judgments = judgment_map(vec![
            (ProviderId::Claude, Some((0.6, 0.4))),
            (ProviderId::Openai, Some((0.7, 0.3))),
            (ProviderId::Grok, Some((0.65, 0.35))),
            (ProviderId::Gemini, None),
        ]);
        let result = simple_average(&judgments).unwrap();
        assert!((result.yes_confidence - 0.65).abs() < 1e-12);
        assert_eq!(result.agent_count, 3);
        assert_eq!(result.judgments.len(), 4);
        assert_eq!(result.absent(), vec![ProviderId::Gemini]);
    }

    #[test]
    fn simple_average_bounded_by_extremes() {
        let judgments = judgment_map(vec![
            (ProviderId::Claude, Some((0.2, 0.9))),
            (ProviderId::Openai, Some((0.9, 0.1))),
            (ProviderId::Grok, Some((0.5, 0.5))),
        ]);
        let result = simple_average(&judgments).unwrap();
        assert!(result.yes_confidence >= 0.2 && result.yes_confidence <= 0.9);
        assert!(result.no_confidence >= 0.1 && result.no_confidence <= 0.9);
    }

    #[test]
    fn simple_average_with_no_judgments_is_quorum_exhausted() {
        let judgments = judgment_map(vec![
            (ProviderId::Claude, None),
            (ProviderId::Openai, None),
        ]);
        let err = simple_average(&judgments).unwrap_err();
        assert!(matches!(err, ConsensusError::QuorumExhausted { .. }));
        assert!(err.to_string().contains("check API credentials"));
    }

    #[test]
    fn unit_weights_reproduce_simple_average_exactly() {
        let judgments = judgment_map(vec![
            (ProviderId::Claude, Some((0.61, 0.39))),
            (ProviderId::Openai, Some((0.74, 0.21))),
            (ProviderId::Gemini, Some((0.55, 0.45))),
        ]);
        let weights: BTreeMap<ProviderId, f64> =
            ProviderId::ALL.iter().map(|id| (*id, 1.0)).collect();

        let simple = simple_average(&judgments).unwrap();
        let weighted = weighted_average(&judgments, &weights).unwrap();
        assert_eq!(simple.yes_confidence, weighted.yes_confidence);
        assert_eq!(simple.no_confidence, weighted.no_confidence);
        assert_eq!(weighted.method, ConsensusMethod::WeightedAverage);
    }

    #[test]
    fn missing_weights_default_to_one() {
        let judgments = judgment_map(vec![
            (ProviderId::Claude, Some((0.8, 0.2))),
            (ProviderId::Openai, Some((0.4, 0.6))),
        ]);
        // Only claude has an explicit weight; openai falls back to 1.0.
        let mut weights = BTreeMap::new();
        weights.insert(ProviderId::Claude, 3.0);

        let result = weighted_average(&judgments, &weights).unwrap();
        // (0.8*3 + 0.4*1) / 4 = 0.7
        assert!((result.yes_confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn zero_total_weight_is_a_validation_error() {
        let judgments = judgment_map(vec![
            (ProviderId::Claude, Some((0.8, 0.2))),
            (ProviderId::Openai, Some((0.4, 0.6))),
        ]);
        let weights: BTreeMap<ProviderId, f64> = [
            (ProviderId::Claude, 0.0),
            (ProviderId::Openai, 0.0),
        ]
        .into_iter()
        .collect();

        let err = weighted_average(&judgments, &weights).unwrap_err();
        assert!(matches!(err, ConsensusError::Validation(_)));
    }

    #[test]
    fn convergence_over_intersection_only() {
        let round1: BTreeMap<ProviderId, Judgment> = [
            (ProviderId::Claude, judgment(ProviderId::Claude, 0.60, 0.40)),
            (ProviderId::Openai, judgment(ProviderId::Openai, 0.70, 0.30)),
            (ProviderId::Grok, judgment(ProviderId::Grok, 0.65, 0.35)),
        ]
        .into_iter()
        .collect();
        // Grok dropped out of round 2.
        let round2: BTreeMap<ProviderId, Judgment> = [
            (ProviderId::Claude, judgment(ProviderId::Claude, 0.62, 0.38)),
            (ProviderId::Openai, judgment(ProviderId::Openai, 0.68, 0.32)),
        ]
        .into_iter()
        .collect();

        let metrics = convergence(&round1, &round2).unwrap();
        assert!((metrics.avg_yes_shift - 0.0).abs() < 1e-12); // +0.02 - 0.02
        assert!((metrics.max_yes_shift - 0.02).abs() < 1e-12);
    }

    #[test]
    fn convergence_empty_intersection_is_none() {
        let round1: BTreeMap<ProviderId, Judgment> = [(
            ProviderId::Claude,
            judgment(ProviderId::Claude, 0.6, 0.4),
        )]
        .into_iter()
        .collect();
        let round2 = BTreeMap::new();
        assert!(convergence(&round1, &round2).is_none());
    }

    #[test]
    fn peer_contexts_exclude_self_and_use_pool_labels() {
        let snapshot = MarketSnapshot {
            market_id: "M".to_string(),
            title: "M".to_string(),
            status: None,
            close_time: None,
            yes_price: None,
            no_price: None,
            volume_24h: None,
            liquidity: None,
            open_interest: None,
            position: None,
            history: vec![],
        };
        let survivors: BTreeMap<ProviderId, Judgment> = [
            (ProviderId::Claude, judgment(ProviderId::Claude, 0.6, 0.4)),
            (ProviderId::Openai, judgment(ProviderId::Openai, 0.7, 0.3)),
            (ProviderId::Grok, judgment(ProviderId::Grok, 0.65, 0.35)),
        ]
        .into_iter()
        .collect();

        let contexts = peer_fed_contexts(&snapshot, &survivors);
        assert_eq!(contexts.len(), 3);

        for (id, context) in &contexts {
            let AnalysisContext::PeerFed { own_prior, peers, .. } = context else {
                panic!("expected peer-fed context");
            };
            assert_eq!(own_prior.source, *id);
            assert_eq!(peers.len(), 2);
            // Peers carry confidences from the other two agents, not self.
            let own_yes = survivors[id].yes_confidence;
            assert!(peers.iter().all(|p| p.yes_confidence != own_yes));
            // Labels come from the fixed pool.
            assert!(peers
                .iter()
                .all(|p| ANALYST_LABELS.contains(&p.label.as_str())));
        }
    }
}
