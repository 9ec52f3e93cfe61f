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

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gateway for the Gemini generateContent API.
///
/// Gemini can refuse via safety filters without an HTTP error; those
/// refusals surface as `AgentError::Refused` and become absences at the
/// gateway boundary like any other failure.
pub struct GeminiAgent {
    client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiAgent {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        debug!(model = %self.model, "calling Gemini generateContent API");
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![TextPart { text: prompt }],
            }],
        };

        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport(ProviderId::Gemini, self.timeout.as_secs(), e))?;

        let response = check_status(ProviderId::Gemini, response).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("gemini: {e}")))?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AgentError::Refused(format!("gemini blocked prompt: {reason}")));
        }

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Parse("gemini returned no candidates".to_string()))?;

        if let Some(reason) = &candidate.finish_reason {
            if reason.contains("SAFETY") {
                return Err(AgentError::Refused(format!(
                    "gemini candidate blocked: {reason}"
                )));
            }
        }

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AgentError::Parse("gemini returned empty response".to_string()));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[async_trait]
impl EstimatorAgent for GeminiAgent {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn judge(&self, context: &AnalysisContext) -> Result<Judgment, AgentError> {
        let raw = self.complete(&analysis_prompt(context)).await?;
        parse_judgment(&raw, ProviderId::Gemini)
    }

    async fn freeform(&self, prompt: &str) -> Result<String, AgentError> {
        self.complete(prompt).await
    }
}
