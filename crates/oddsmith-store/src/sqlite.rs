use chrono::{DateTime, Utc};
use oddsmith_models::market::Side;
use oddsmith_models::signal::{Decision, SignalType, TradeDecision, TradingSignal};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::schema::{MarketRecord, NewAnalysis, PositionRecord, StoredAnalysis, SCHEMA_DDL};

/// SQLite accessor owning the single connection.
///
/// Analyses, signals and decisions are insert-only; nothing here updates
/// those rows in place, so single-row insert atomicity is the only
/// discipline required of the storage engine.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating directories, tables and indexes as needed).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("create {parent:?}: {e}")))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(Self { conn })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(Self { conn })
    }

    // ---- markets ----

    pub fn upsert_market(&self, market: &MarketRecord) -> Result<(), StoreError> {
        let now = Utc::now();
        let metadata = market
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO markets (id, title, close_time, status, category, metadata, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
             ON CONFLICT(id) DO UPDATE SET \
                 title = excluded.title, close_time = excluded.close_time, \
                 status = excluded.status, category = excluded.category, \
                 metadata = excluded.metadata, updated_at = excluded.updated_at",
            params![
                market.id,
                market.title,
                market.close_time,
                market.status,
                market.category,
                metadata,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_market(&self, id: &str) -> Result<Option<MarketRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, close_time, status, category, metadata \
                 FROM markets WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<DateTime<Utc>>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, title, close_time, status, category, metadata)| {
            Ok(MarketRecord {
                id,
                title,
                close_time,
                status,
                category,
                metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
            })
        })
        .transpose()
    }

    pub fn all_markets(&self) -> Result<Vec<MarketRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, title, close_time, status, category, metadata \
             FROM markets ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<DateTime<Utc>>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, title, close_time, status, category, metadata)| {
                Ok(MarketRecord {
                    id,
                    title,
                    close_time,
                    status,
                    category,
                    metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
                })
            })
            .collect()
    }

    pub fn market_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.get_market(id)?.is_some())
    }

    // ---- positions ----

    pub fn upsert_position(&self, position: &PositionRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO positions (market_id, option, side, quantity, avg_price, unrealized_pnl, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(market_id, option, side) DO UPDATE SET \
                 quantity = excluded.quantity, avg_price = excluded.avg_price, \
                 unrealized_pnl = excluded.unrealized_pnl, updated_at = excluded.updated_at",
            params![
                position.market_id,
                position.option,
                position.side.as_str(),
                position.quantity,
                position.avg_price,
                position.unrealized_pnl,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn positions_by_market(&self, market_id: &str) -> Result<Vec<PositionRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT market_id, option, side, quantity, avg_price, unrealized_pnl \
             FROM positions WHERE market_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![market_id], position_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(position_from_columns).collect()
    }

    /// Positions with contracts still held, across all markets.
    pub fn open_positions(&self) -> Result<Vec<PositionRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT market_id, option, side, quantity, avg_price, unrealized_pnl \
             FROM positions WHERE quantity > 0",
        )?;
        let rows = stmt
            .query_map([], position_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(position_from_columns).collect()
    }

    // ---- analyses ----

    pub fn insert_analysis(&self, new: &NewAnalysis) -> Result<i64, StoreError> {
        let consensus_json = serde_json::to_string(&new.consensus)?;
        self.conn.execute(
            "INSERT INTO analyses (market_id, option, analyzed_at, consensus_yes, consensus_no, \
             method, consensus_json, yes_price, no_price, volume_24h, liquidity, previous_analysis_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                new.market_id,
                new.option,
                new.analyzed_at,
                new.consensus.yes_confidence,
                new.consensus.no_confidence,
                new.consensus.method.as_str(),
                consensus_json,
                new.yes_price,
                new.no_price,
                new.volume_24h,
                new.liquidity,
                new.previous_analysis_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn latest_analysis(
        &self,
        market_id: &str,
        option: &str,
    ) -> Result<Option<StoredAnalysis>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, market_id, option, analyzed_at, consensus_json, yes_price, no_price, \
                 volume_24h, liquidity, previous_analysis_id \
                 FROM analyses WHERE market_id = ?1 AND option = ?2 \
                 ORDER BY analyzed_at DESC, id DESC LIMIT 1",
                params![market_id, option],
                analysis_columns,
            )
            .optional()?;
        row.map(analysis_from_columns).transpose()
    }

    /// Analysis history for a market, most recent first.
    pub fn analysis_history(
        &self,
        market_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredAnalysis>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, market_id, option, analyzed_at, consensus_json, yes_price, no_price, \
             volume_24h, liquidity, previous_analysis_id \
             FROM analyses WHERE market_id = ?1 \
             ORDER BY analyzed_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![market_id, limit as i64], analysis_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(analysis_from_columns).collect()
    }

    // ---- signals ----

    pub fn insert_signal(&self, signal: &TradingSignal) -> Result<(), StoreError> {
        let signal_json = serde_json::to_string(signal)?;
        self.conn.execute(
            "INSERT INTO signals (id, market_id, option, signal_type, created_at, \
             divergence_magnitude, passed_filters, signal_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                signal.id.to_string(),
                signal.market_id,
                signal.option,
                signal.signal_type.as_str(),
                signal.created_at,
                signal.divergence_magnitude,
                signal.passed_filters,
                signal_json,
            ],
        )?;
        Ok(())
    }

    pub fn recent_signals(
        &self,
        limit: usize,
        kind: Option<SignalType>,
    ) -> Result<Vec<TradingSignal>, StoreError> {
        let jsons: Vec<String> = match kind {
            Some(kind) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT signal_json FROM signals WHERE signal_type = ?1 \
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![kind.as_str(), limit as i64], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT signal_json FROM signals ORDER BY created_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        jsons
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::Json))
            .collect()
    }

    // ---- decisions ----

    pub fn insert_decision(&self, decision: &TradeDecision) -> Result<(), StoreError> {
        let decision_json = serde_json::to_string(decision)?;
        self.conn.execute(
            "INSERT INTO decisions (id, signal_id, decision, executed, created_at, decision_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                decision.id.to_string(),
                decision.signal_id.to_string(),
                decision.decision.as_str(),
                decision.executed,
                decision.created_at,
                decision_json,
            ],
        )?;
        Ok(())
    }

    pub fn decision_history(
        &self,
        limit: usize,
        filter: Option<Decision>,
    ) -> Result<Vec<TradeDecision>, StoreError> {
        let jsons: Vec<String> = match filter {
            Some(decision) => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT decision_json FROM decisions WHERE decision = ?1 \
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![decision.as_str(), limit as i64], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT decision_json FROM decisions ORDER BY created_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        jsons
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::Json))
            .collect()
    }

    /// Count of executed trades since `since`, for the daily throttle.
    pub fn executed_trades_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM decisions WHERE executed = 1 AND created_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

type PositionColumns = (String, String, String, i64, f64, Option<f64>);

fn position_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<PositionColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn position_from_columns(cols: PositionColumns) -> Result<PositionRecord, StoreError> {
    let (market_id, option, side, quantity, avg_price, unrealized_pnl) = cols;
    let side = match side.as_str() {
        "yes" => Side::Yes,
        "no" => Side::No,
        other => return Err(StoreError::Corrupt(format!("unknown side: {other}"))),
    };
    Ok(PositionRecord {
        market_id,
        option,
        side,
        quantity,
        avg_price,
        unrealized_pnl,
    })
}

type AnalysisColumns = (
    i64,
    String,
    String,
    DateTime<Utc>,
    String,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<i64>,
);

fn analysis_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn analysis_from_columns(cols: AnalysisColumns) -> Result<StoredAnalysis, StoreError> {
    let (
        id,
        market_id,
        option,
        analyzed_at,
        consensus_json,
        yes_price,
        no_price,
        volume_24h,
        liquidity,
        previous_analysis_id,
    ) = cols;
    Ok(StoredAnalysis {
        id,
        market_id,
        option,
        analyzed_at,
        consensus: serde_json::from_str(&consensus_json)?,
        yes_price,
        no_price,
        volume_24h,
        liquidity,
        previous_analysis_id,
    })
}
