use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a binary market a price or position refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market-level facts consumed by the risk filter, as reported by the
/// exchange client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketFacts {
    pub title: String,
    pub status: Option<String>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub open_interest: Option<i64>,
    pub close_time: Option<DateTime<Utc>>,
}

/// An order handed to the exchange client for placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub market_id: String,
    pub side: Side,
    /// "buy" or "sell".
    pub action: String,
    pub quantity: i64,
    pub limit_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Yes).unwrap(), "\"yes\"");
        assert_eq!(serde_json::to_string(&Side::No).unwrap(), "\"no\"");
    }

    #[test]
    fn roundtrip_market_facts() {
        let facts = MarketFacts {
            title: "Will turnout exceed 60%?".to_string(),
            status: Some("open".to_string()),
            volume_24h: Some(1250.0),
            liquidity: Some(430.0),
            open_interest: Some(900),
            close_time: Some(Utc::now()),
        };
        let json = serde_json::to_string(&facts).unwrap();
        let parsed: MarketFacts = serde_json::from_str(&json).unwrap();
        assert_eq!(facts, parsed);
    }
}
