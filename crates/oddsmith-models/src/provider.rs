use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of estimator providers the engine knows how to drive.
///
/// Configuration referencing anything outside this set is rejected at
/// startup rather than at lookup time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Claude,
    Openai,
    Grok,
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Claude,
        ProviderId::Openai,
        ProviderId::Grok,
        ProviderId::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::Openai => "openai",
            ProviderId::Grok => "grok",
            ProviderId::Gemini => "gemini",
        }
    }

    /// Model used when the provider entry in configuration omits one.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude-3-5-sonnet-20241022",
            ProviderId::Openai => "gpt-4-turbo-preview",
            ProviderId::Grok => "grok-2-latest",
            ProviderId::Gemini => "gemini-1.5-pro",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderId::Claude => "ANTHROPIC_API_KEY",
            ProviderId::Openai => "OPENAI_API_KEY",
            ProviderId::Grok => "XAI_API_KEY",
            ProviderId::Gemini => "GOOGLE_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(ProviderId::Claude),
            "openai" => Ok(ProviderId::Openai),
            "grok" => Ok(ProviderId::Grok),
            "gemini" => Ok(ProviderId::Gemini),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}
