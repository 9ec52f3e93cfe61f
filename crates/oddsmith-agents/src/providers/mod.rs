//! HTTP gateways for the supported estimator providers.
//!
//! Each gateway owns its own `reqwest` client, applies the configured
//! per-request timeout, and maps transport/status failures into the
//! [`AgentError`](crate::error::AgentError) taxonomy. Response payloads
//! are handed to the parser, which tolerates fenced or prose-wrapped
//! JSON.

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicAgent;
pub use gemini::GeminiAgent;
pub use openai::OpenAiCompatAgent;

use oddsmith_models::provider::ProviderId;

use crate::error::AgentError;

/// Map an HTTP status + body into the error taxonomy. Success statuses
/// pass the response through untouched.
pub(crate) async fn check_status(
    provider: ProviderId,
    response: reqwest::Response,
) -> Result<reqwest::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    match status.as_u16() {
        401 | 403 => Err(AgentError::Auth(format!("{provider}: {status}"))),
        429 => Err(AgentError::RateLimited(format!("{provider}: {status}"))),
        _ => Err(AgentError::Http(format!("{provider}: {status}: {detail}"))),
    }
}

/// Map a reqwest transport error, distinguishing timeouts.
pub(crate) fn map_transport(
    provider: ProviderId,
    timeout_secs: u64,
    error: reqwest::Error,
) -> AgentError {
    if error.is_timeout() {
        AgentError::Timeout(timeout_secs)
    } else {
        AgentError::Http(format!("{provider}: {error}"))
    }
}
