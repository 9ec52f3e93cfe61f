use chrono::{DateTime, Utc};
use oddsmith_models::consensus::ConsensusResult;
use oddsmith_models::market::Side;
use serde::{Deserialize, Serialize};

/// Database schema.
///
/// `analyses`, `signals` and `decisions` are append-only; `markets` and
/// `positions` are upserted. The full model object is kept as a JSON
/// column next to the few fields that are queried directly.
pub const SCHEMA_DDL: &str = "\
CREATE TABLE IF NOT EXISTS markets (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    close_time  TEXT,
    status      TEXT,
    category    TEXT,
    metadata    TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS positions (
    market_id       TEXT NOT NULL,
    option          TEXT NOT NULL,
    side            TEXT NOT NULL,
    quantity        INTEGER NOT NULL,
    avg_price       REAL NOT NULL,
    unrealized_pnl  REAL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (market_id, option, side)
);

CREATE TABLE IF NOT EXISTS analyses (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    market_id             TEXT NOT NULL,
    option                TEXT NOT NULL,
    analyzed_at           TEXT NOT NULL,
    consensus_yes         REAL NOT NULL,
    consensus_no          REAL NOT NULL,
    method                TEXT NOT NULL,
    consensus_json        TEXT NOT NULL,
    yes_price             REAL,
    no_price              REAL,
    volume_24h            REAL,
    liquidity             REAL,
    previous_analysis_id  INTEGER REFERENCES analyses(id)
);
CREATE INDEX IF NOT EXISTS idx_analyses_market ON analyses(market_id, option, analyzed_at DESC);

CREATE TABLE IF NOT EXISTS signals (
    id                    TEXT PRIMARY KEY,
    market_id             TEXT NOT NULL,
    option                TEXT NOT NULL,
    signal_type           TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    divergence_magnitude  REAL NOT NULL,
    passed_filters        INTEGER NOT NULL,
    signal_json           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_signals_created ON signals(created_at DESC);

CREATE TABLE IF NOT EXISTS decisions (
    id             TEXT PRIMARY KEY,
    signal_id      TEXT NOT NULL REFERENCES signals(id),
    decision       TEXT NOT NULL,
    executed       INTEGER NOT NULL,
    created_at     TEXT NOT NULL,
    decision_json  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_created ON decisions(created_at DESC);
";

/// A tracked market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketRecord {
    pub id: String,
    pub title: String,
    pub close_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// An open (or closed-out, quantity 0) position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    pub market_id: String,
    pub option: String,
    pub side: Side,
    pub quantity: i64,
    pub avg_price: f64,
    pub unrealized_pnl: Option<f64>,
}

/// A consensus run awaiting insertion.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub market_id: String,
    pub option: String,
    pub analyzed_at: DateTime<Utc>,
    pub consensus: ConsensusResult,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub previous_analysis_id: Option<i64>,
}

/// A consensus run as read back from the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredAnalysis {
    pub id: i64,
    pub market_id: String,
    pub option: String,
    pub analyzed_at: DateTime<Utc>,
    pub consensus: ConsensusResult,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub previous_analysis_id: Option<i64>,
}

impl StoredAnalysis {
    /// Whether this analysis is younger than `max_age`.
    pub fn is_fresh(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.analyzed_at) < max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use oddsmith_models::consensus::ConsensusMethod;
    use std::collections::BTreeMap;

    fn sample_analysis(age_hours: i64) -> StoredAnalysis {
        StoredAnalysis {
            id: 1,
            market_id: "M".to_string(),
            option: "M".to_string(),
            analyzed_at: Utc::now() - Duration::hours(age_hours),
            consensus: ConsensusResult {
                yes_confidence: 0.6,
                no_confidence: 0.4,
                method: ConsensusMethod::SimpleAverage,
                agent_count: 1,
                judgments: BTreeMap::new(),
                rounds_completed: 1,
                round1: None,
                convergence: None,
            },
            yes_price: Some(0.5),
            no_price: Some(0.5),
            volume_24h: None,
            liquidity: None,
            previous_analysis_id: None,
        }
    }

    #[test]
    fn freshness_window() {
        let now = Utc::now();
        assert!(sample_analysis(1).is_fresh(Duration::hours(24), now));
        assert!(!sample_analysis(25).is_fresh(Duration::hours(24), now));
    }

    #[test]
    fn ddl_creates_all_tables() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_DDL).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('markets', 'positions', 'analyses', 'signals', 'decisions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }
}
