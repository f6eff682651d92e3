//! Persistence of detected opportunities and executed trades.
//!
//! Writes are best effort: callers log failures and carry on.

use crate::errors::Result;
use crate::models::{ExecutionResult, LegResult, OpportunityResult, Side};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS opportunities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    pairs TEXT NOT NULL,
    net_profit REAL NOT NULL,
    profit_percent REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trade_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    pairs TEXT NOT NULL,
    initial_amount REAL NOT NULL,
    final_amount REAL NOT NULL,
    expected_profit REAL NOT NULL,
    profit REAL NOT NULL,
    profit_percent REAL NOT NULL,
    legs_filled INTEGER NOT NULL,
    simulation_mode INTEGER NOT NULL,
    success INTEGER NOT NULL,
    errors TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trade_history_created ON trade_history(created_at DESC);

CREATE TABLE IF NOT EXISTS trade_legs (
    trade_id INTEGER NOT NULL REFERENCES trade_history(id),
    leg INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity_sent REAL NOT NULL,
    quantity_received REAL NOT NULL,
    execution_price REAL NOT NULL,
    order_id TEXT,
    filled INTEGER NOT NULL,
    error TEXT,
    PRIMARY KEY (trade_id, leg)
);

CREATE TABLE IF NOT EXISTS bot_status (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    is_running INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct OpportunityRecord {
    pub path: String,
    pub pairs: String,
    pub net_profit: f64,
    pub profit_percent: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&OpportunityResult> for OpportunityRecord {
    fn from(opp: &OpportunityResult) -> Self {
        Self {
            path: opp.triangle.route(),
            pairs: opp.triangle.pairs().join(","),
            net_profit: opp.net_profit,
            profit_percent: opp.net_profit_percent,
            created_at: Utc::now(),
        }
    }
}

/// One leg of a trade as persisted, filled or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLegRecord {
    /// 1-based position in the triangle.
    pub leg: usize,
    pub filled: bool,
    pub result: LegResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub path: String,
    pub pairs: String,
    pub initial_amount: f64,
    pub final_amount: f64,
    pub expected_profit: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub legs_filled: usize,
    pub simulation_mode: bool,
    pub success: bool,
    pub errors: String,
    /// Filled legs followed by the failing attempt, if it reached the exchange.
    pub legs: Vec<TradeLegRecord>,
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(opp: &OpportunityResult, exec: &ExecutionResult, simulation_mode: bool) -> Self {
        let mut legs: Vec<TradeLegRecord> = exec
            .legs
            .iter()
            .enumerate()
            .map(|(i, leg)| TradeLegRecord {
                leg: i + 1,
                filled: true,
                result: leg.clone(),
            })
            .collect();
        if let Some(attempt) = &exec.failed_leg {
            legs.push(TradeLegRecord {
                leg: exec.legs.len() + 1,
                filled: false,
                result: attempt.clone(),
            });
        }

        Self {
            path: opp.triangle.route(),
            pairs: opp.triangle.pairs().join(","),
            initial_amount: exec.initial_amount,
            final_amount: exec.final_amount,
            expected_profit: opp.net_profit,
            profit: exec.realized_profit,
            profit_percent: exec.realized_profit_percent,
            legs_filled: exec.legs.len(),
            simulation_mode,
            success: exec.success,
            errors: exec.errors.join("; "),
            legs,
            created_at: Utc::now(),
        }
    }
}

/// Destination for scan and execution records.
pub trait ResultSink: Send + Sync {
    fn save_opportunity(&self, record: &OpportunityRecord) -> Result<()>;
    fn save_trade(&self, record: &TradeRecord) -> Result<()>;
    /// Record whether the scan loop is currently running.
    fn save_status(&self, running: bool) -> Result<()>;
}

/// Discards every record. Used when no database is available.
pub struct NullSink;

impl ResultSink for NullSink {
    fn save_opportunity(&self, _record: &OpportunityRecord) -> Result<()> {
        Ok(())
    }

    fn save_trade(&self, _record: &TradeRecord) -> Result<()> {
        Ok(())
    }

    fn save_status(&self, _running: bool) -> Result<()> {
        Ok(())
    }
}

/// SQLite-backed sink.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock();
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn latest_trade_id(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let id = conn.query_row("SELECT MAX(id) FROM trade_history", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(id)
    }

    /// Legs stored for a trade, in execution order.
    pub fn trade_legs(&self, trade_id: i64) -> Result<Vec<TradeLegRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT leg, filled, symbol, side, quantity_sent, quantity_received,
                    execution_price, order_id, error
             FROM trade_legs WHERE trade_id = ?1 ORDER BY leg",
        )?;
        let rows = stmt.query_map(params![trade_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;

        let mut legs = Vec::new();
        for row in rows {
            let (leg, filled, symbol, side, sent, received, price, order_id, error) = row?;
            legs.push(TradeLegRecord {
                leg: leg as usize,
                filled,
                result: LegResult {
                    symbol,
                    side: side.parse::<Side>()?,
                    quantity_sent: sent,
                    quantity_received: received,
                    execution_price: price,
                    order_id,
                    error,
                },
            });
        }
        Ok(legs)
    }

    /// Last recorded running flag, `None` before the first start.
    pub fn running_status(&self) -> Result<Option<bool>> {
        let conn = self.conn.lock();
        let running = conn
            .query_row("SELECT is_running FROM bot_status WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        Ok(running)
    }
}

impl ResultSink for SqliteSink {
    fn save_opportunity(&self, record: &OpportunityRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO opportunities (path, pairs, net_profit, profit_percent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.path,
                record.pairs,
                record.net_profit,
                record.profit_percent,
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!(path = %record.path, "[DB] opportunity saved");
        Ok(())
    }

    fn save_trade(&self, record: &TradeRecord) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO trade_history (path, pairs, initial_amount, final_amount, expected_profit,
                profit, profit_percent, legs_filled, simulation_mode, success, errors, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.path,
                record.pairs,
                record.initial_amount,
                record.final_amount,
                record.expected_profit,
                record.profit,
                record.profit_percent,
                record.legs_filled as i64,
                record.simulation_mode,
                record.success,
                record.errors,
                record.created_at.to_rfc3339(),
            ],
        )?;
        let trade_id = tx.last_insert_rowid();
        {
            let mut insert = tx.prepare(
                "INSERT INTO trade_legs (trade_id, leg, symbol, side, quantity_sent,
                    quantity_received, execution_price, order_id, filled, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for leg in &record.legs {
                let r = &leg.result;
                insert.execute(params![
                    trade_id,
                    leg.leg as i64,
                    r.symbol,
                    r.side.as_str(),
                    r.quantity_sent,
                    r.quantity_received,
                    r.execution_price,
                    r.order_id,
                    leg.filled,
                    r.error,
                ])?;
            }
        }
        tx.commit()?;
        debug!(trade_id, path = %record.path, success = record.success, legs = record.legs.len(), "[DB] trade saved");
        Ok(())
    }

    fn save_status(&self, running: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bot_status (id, is_running, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET is_running = excluded.is_running, updated_at = excluded.updated_at",
            params![running, Utc::now().to_rfc3339()],
        )?;
        debug!(running, "[DB] status saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionState, PairInfo, Triangle};

    fn opportunity() -> OpportunityResult {
        let triangle = Triangle::new(
            "USDT",
            [
                &PairInfo::new("BTCUSDT", "BTC", "USDT"),
                &PairInfo::new("BTCETH", "BTC", "ETH"),
                &PairInfo::new("ETHUSDT", "ETH", "USDT"),
            ],
        )
        .expect("valid triangle");
        OpportunityResult {
            triangle,
            initial_amount: 100.0,
            final_amount: 100.8,
            gross_profit: 1.1,
            net_profit: 0.8,
            net_profit_percent: 0.8,
            total_fees: 1.6,
            prices_used: [50000.0, 0.06, 3000.0],
        }
    }

    fn filled(symbol: &str, side: Side, sent: f64, received: f64, id: &str) -> LegResult {
        LegResult {
            symbol: symbol.into(),
            side,
            quantity_sent: sent,
            quantity_received: received,
            execution_price: if side == Side::Buy { sent / received } else { received / sent },
            order_id: Some(id.into()),
            error: None,
        }
    }

    fn third_leg_failure() -> ExecutionResult {
        let mut rejected = filled("ETHUSDT", Side::Sell, 0.12, 0.0, "0");
        rejected.order_id = None;
        rejected.execution_price = 3000.0;
        rejected.error = Some("Exchange error -2010: insufficient balance".into());
        ExecutionResult {
            success: false,
            state: ExecutionState::Failed { leg: 3 },
            legs: vec![
                filled("BTCUSDT", Side::Buy, 100.0, 0.002, "101"),
                filled("BTCETH", Side::Sell, 0.002, 0.12, "102"),
            ],
            failed_leg: Some(rejected),
            initial_amount: 100.0,
            final_amount: 0.0,
            realized_profit: 0.0,
            realized_profit_percent: 0.0,
            errors: vec!["leg 3 (SELL ETHUSDT) failed: insufficient balance".into()],
        }
    }

    #[test]
    fn opportunity_record_flattens_triangle() {
        let rec = OpportunityRecord::from(&opportunity());
        assert_eq!(rec.path, "USDT → BTC → ETH → USDT");
        assert_eq!(rec.pairs, "BTCUSDT,BTCETH,ETHUSDT");
        assert_eq!(rec.profit_percent, 0.8);
    }

    #[test]
    fn saves_opportunities_and_failed_trades() {
        let sink = SqliteSink::in_memory().expect("in-memory db");
        let opp = opportunity();
        sink.save_opportunity(&OpportunityRecord::from(&opp)).expect("insert");
        sink.save_opportunity(&OpportunityRecord::from(&opp)).expect("insert");

        let exec = ExecutionResult {
            success: false,
            state: ExecutionState::Failed { leg: 1 },
            legs: Vec::new(),
            failed_leg: None,
            initial_amount: 100.0,
            final_amount: 0.0,
            realized_profit: 0.0,
            realized_profit_percent: 0.0,
            errors: vec!["leg 1 (BUY BTCUSDT) failed: Timed out".into()],
        };
        let rec = TradeRecord::new(&opp, &exec, true);
        assert!(!rec.success);
        assert!(rec.legs.is_empty());
        assert_eq!(rec.expected_profit, 0.8);
        sink.save_trade(&rec).expect("insert");

        assert_eq!(sink.count("opportunities").expect("count"), 2);
        assert_eq!(sink.count("trade_history").expect("count"), 1);
        assert_eq!(sink.count("trade_legs").expect("count"), 0);
    }

    #[test]
    fn partial_trade_legs_read_back_for_reconciliation() {
        let sink = SqliteSink::in_memory().expect("in-memory db");
        let exec = third_leg_failure();
        let rec = TradeRecord::new(&opportunity(), &exec, false);
        assert_eq!(rec.legs_filled, 2);
        sink.save_trade(&rec).expect("insert");

        let trade_id = sink.latest_trade_id().expect("query").expect("one trade");
        let legs = sink.trade_legs(trade_id).expect("legs");
        assert_eq!(legs.len(), 3);
        assert_eq!(legs.iter().map(|l| l.leg).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(legs[0].filled && legs[1].filled && !legs[2].filled);
        assert_eq!(legs[0].result, exec.legs[0]);
        assert_eq!(legs[1].result.order_id.as_deref(), Some("102"));
        assert_eq!(legs[1].result.quantity_received, 0.12);
        assert_eq!(legs[2].result.side, Side::Sell);
        assert!(legs[2].result.order_id.is_none());
        assert!(legs[2].result.error.as_deref().is_some_and(|e| e.contains("-2010")));
    }

    #[test]
    fn status_row_tracks_latest_state() {
        let sink = SqliteSink::in_memory().expect("in-memory db");
        assert_eq!(sink.running_status().expect("query"), None);
        sink.save_status(true).expect("upsert");
        assert_eq!(sink.running_status().expect("query"), Some(true));
        sink.save_status(false).expect("upsert");
        assert_eq!(sink.running_status().expect("query"), Some(false));
        assert_eq!(sink.count("bot_status").expect("count"), 1);
    }

    #[test]
    fn null_sink_accepts_everything() {
        let opp = opportunity();
        assert!(NullSink.save_opportunity(&OpportunityRecord::from(&opp)).is_ok());
        assert!(NullSink.save_status(true).is_ok());
    }
}
