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

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Gateway for the Anthropic Messages API.
pub struct AnthropicAgent {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicAgent {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        debug!(model = %self.model, "calling Anthropic messages API");
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(API_URL)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport(ProviderId::Claude, self.timeout.as_secs(), e))?;

        let response = check_status(ProviderId::Claude, response).await?;
        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("claude: {e}")))?;

        let text: String = body
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(AgentError::Parse("claude returned empty response".to_string()));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl EstimatorAgent for AnthropicAgent {
    fn provider(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn judge(&self, context: &AnalysisContext) -> Result<Judgment, AgentError> {
        let raw = self.complete(&analysis_prompt(context)).await?;
        parse_judgment(&raw, ProviderId::Claude)
    }

    async fn freeform(&self, prompt: &str) -> Result<String, AgentError> {
        self.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let request = MessagesRequest {
            model: "claude-3-5-sonnet-20241022",
            max_tokens: 1024,
            messages: vec![Message {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn response_deserialization_joins_blocks() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "{\"yes_confidence\": "},
                {"type": "text", "text": "0.7}"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let response: MessagesResponse = serde_json::from_str(json).unwrap();
        let combined: String = response.content.into_iter().map(|b| b.text).collect();
        assert_eq!(combined, r#"{"yes_confidence": 0.7}"#);
    }

    #[test]
    fn constructor_keeps_settings() {
        let agent = AnthropicAgent::new("key", "model-x", 512, Duration::from_secs(30));
        assert_eq!(agent.model, "model-x");
        assert_eq!(agent.max_tokens, 512);
        assert_eq!(agent.provider(), ProviderId::Claude);
    }
}
