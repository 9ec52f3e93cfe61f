use oddsmith_models::provider::ProviderId;
use thiserror::Error;

/// Failure inside a single estimator call. These never escape the
/// gateway boundary as errors; the settle wrapper converts them to
/// explicit absences.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider refused the request: {0}")]
    Refused(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("response parse error: {0}")]
    Parse(String),
}

/// Failure of a consensus stage, surfaced to the caller of that stage.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(
        "no provider returned a judgment in round 1 (attempted: {attempted:?}); \
         check API credentials for the listed providers"
    )]
    QuorumExhausted { attempted: Vec<ProviderId> },

    #[error("invalid consensus request: {0}")]
    Validation(String),
}
