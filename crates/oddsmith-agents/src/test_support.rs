//! Scripted estimator agents for exercising the consensus protocol
//! without network access.
//!
//! A `ScriptedAgent` answers round 1 and round 2 from fixed scripts
//! (selected by which context variant it receives) and serves freeform
//! calls from a queue of canned raw responses. Everything it is asked
//! is recorded so tests can assert on peer-feedback construction.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use oddsmith_models::context::AnalysisContext;
use oddsmith_models::judgment::Judgment;
use oddsmith_models::provider::ProviderId;

use crate::error::AgentError;
use crate::gateway::EstimatorAgent;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Confidences { yes: f64, no: f64 },
    Fail(String),
}

pub struct ScriptedAgent {
    provider: ProviderId,
    round1: ScriptedReply,
    round2: ScriptedReply,
    freeform_replies: Mutex<VecDeque<Result<String, String>>>,
    pub seen_contexts: Mutex<Vec<AnalysisContext>>,
    pub seen_prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(provider: ProviderId, round1: ScriptedReply, round2: ScriptedReply) -> Self {
        Self {
            provider,
            round1,
            round2,
            freeform_replies: Mutex::new(VecDeque::new()),
            seen_contexts: Mutex::new(Vec::new()),
            seen_prompts: Mutex::new(Vec::new()),
        }
    }

    /// Same confidences in both rounds.
    pub fn steady(provider: ProviderId, yes: f64, no: f64) -> Self {
        Self::new(
            provider,
            ScriptedReply::Confidences { yes, no },
            ScriptedReply::Confidences { yes, no },
        )
    }

    /// Fails every judgment call.
    pub fn failing(provider: ProviderId) -> Self {
        let fail = ScriptedReply::Fail("scripted failure".to_string());
        Self::new(provider, fail.clone(), fail)
    }

    /// Serves freeform calls from `replies` in order; judgment calls fail.
    pub fn with_freeform(provider: ProviderId, replies: Vec<Result<String, String>>) -> Self {
        let agent = Self::failing(provider);
        *agent.freeform_replies.lock().unwrap() = replies.into_iter().collect();
        agent
    }

    fn judgment(&self, yes: f64, no: f64) -> Judgment {
        Judgment {
            yes_confidence: yes,
            no_confidence: no,
            reasoning: format!("{} scripted reasoning", self.provider),
            source: self.provider,
        }
    }

    /// Contexts this agent was asked to judge, in call order.
    pub fn contexts(&self) -> Vec<AnalysisContext> {
        self.seen_contexts.lock().unwrap().clone()
    }

    /// Freeform prompts this agent received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.seen_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EstimatorAgent for ScriptedAgent {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn judge(&self, context: &AnalysisContext) -> Result<Judgment, AgentError> {
        self.seen_contexts.lock().unwrap().push(context.clone());
        let reply = match context {
            AnalysisContext::Plain(_) => &self.round1,
            AnalysisContext::PeerFed { .. } => &self.round2,
        };
        match reply {
            ScriptedReply::Confidences { yes, no } => Ok(self.judgment(*yes, *no)),
            ScriptedReply::Fail(message) => Err(AgentError::Http(message.clone())),
        }
    }

    async fn freeform(&self, prompt: &str) -> Result<String, AgentError> {
        self.seen_prompts.lock().unwrap().push(prompt.to_string());
        match self.freeform_replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AgentError::Http(message)),
            None => Err(AgentError::Http("no scripted reply left".to_string())),
        }
    }
}
