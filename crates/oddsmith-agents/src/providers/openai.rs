use std::time::Duration;

use async_trait::async_trait;
use oddsmith_models::context::AnalysisContext;
use oddsmith_models::judgment::Judgment;
use oddsmith_models::provider::ProviderId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::gateway::EstimatorAgent;
use crate::parser::parse_judgment;
use crate::prompts::analysis_prompt;
use crate::providers::{check_status, map_transport};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const XAI_BASE_URL: &str = "https://api.x.ai/v1";

/// Gateway for OpenAI-compatible chat-completions APIs. Drives both
/// OpenAI proper and Grok (xAI exposes the same surface at a different
/// base URL).
pub struct OpenAiCompatAgent {
    provider: ProviderId,
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiCompatAgent {
    pub fn openai(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self::with_base(ProviderId::Openai, OPENAI_BASE_URL, api_key, model, max_tokens, timeout)
    }

    pub fn grok(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self::with_base(ProviderId::Grok, XAI_BASE_URL, api_key, model, max_tokens, timeout)
    }

    fn with_base(
        provider: ProviderId,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            client: Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        debug!(provider = %self.provider, model = %self.model, "calling chat completions API");
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport(self.provider, self.timeout.as_secs(), e))?;

        let response = check_status(self.provider, response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("{}: {e}", self.provider)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AgentError::Parse(format!(
                "{} returned empty response",
                self.provider
            )));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl EstimatorAgent for OpenAiCompatAgent {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn judge(&self, context: &AnalysisContext) -> Result<Judgment, AgentError> {
        let raw = self.complete(&analysis_prompt(context)).await?;
        parse_judgment(&raw, self.provider)
    }

    async fn freeform(&self, prompt: &str) -> Result<String, AgentError> {
        self.complete(prompt).await
    }
}
