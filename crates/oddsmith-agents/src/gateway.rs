use async_trait::async_trait;
use oddsmith_models::context::AnalysisContext;
use oddsmith_models::judgment::{AgentOutcome, Judgment};
use oddsmith_models::provider::ProviderId;
use tracing::warn;

use crate::error::AgentError;

/// One estimator agent behind a uniform contract. Mockable for testing.
///
/// `judge` produces a structured judgment for an analysis context;
/// `freeform` returns raw text for an arbitrary prompt (used by the
/// dependency detector and screening). Both are fallible at this level;
/// callers that must not see failures go through [`settle_judge`].
#[async_trait]
pub trait EstimatorAgent: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn judge(&self, context: &AnalysisContext) -> Result<Judgment, AgentError>;

    async fn freeform(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Run one judgment call and convert any failure into an explicit
/// absence. This is the gateway boundary: transport, parse, auth,
/// rate-limit and refusal errors all end here as `Absent`.
pub async fn settle_judge(agent: &dyn EstimatorAgent, context: &AnalysisContext) -> AgentOutcome {
    match agent.judge(context).await {
        Ok(judgment) => AgentOutcome::Judged(judgment),
        Err(error) => {
            warn!(provider = %agent.provider(), %error, "estimator failed; treating as absent");
            AgentOutcome::Absent {
                reason: error.to_string(),
            }
        }
    }
}
