//! SQLite results store.
//!
//! RULE: Only store.rs talks to the database.
//! The pipeline and the runner call store methods; they never
//! execute SQL directly.

use crate::{
    error::{DetectError, DetectResult},
    evaluator::EvaluationMetrics,
    generator::Transaction,
    types::Label,
};
use rusqlite::{params, Connection, OptionalExtension};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One persisted score joined back to its transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub transaction_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub destination_country: String,
    pub timestamp: String,
    pub anomaly_score: f64,
    pub is_anomaly: Label,
}

pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    /// Open (or create) the results database at `path`.
    pub fn open(path: &str) -> DetectResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DetectResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DetectResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> DetectResult<()> {
        let started_at = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, started_at],
        )?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    pub fn insert_transactions(&self, run_id: &str, rows: &[Transaction]) -> DetectResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO txn (
                    run_id, transaction_id, customer_id, timestamp, amount, currency,
                    origin_country, destination_country, channel, device_type,
                    is_anomaly, anomaly_type
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for t in rows {
                stmt.execute(params![
                    run_id,
                    &t.transaction_id,
                    &t.customer_id,
                    t.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    t.amount,
                    &t.currency,
                    &t.origin_country,
                    &t.destination_country,
                    t.channel.as_str(),
                    t.device_type.as_str(),
                    t.is_anomaly as i64,
                    t.anomaly_type.map(|a| a.as_str()),
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("store: inserted {} transactions for {run_id}", rows.len());
        Ok(())
    }

    pub fn transaction_count(&self, run_id: &str) -> DetectResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM txn WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn anomaly_label_count(&self, run_id: &str) -> DetectResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM txn WHERE run_id = ?1 AND is_anomaly = 1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    // ── Scores ─────────────────────────────────────────────────

    pub fn insert_scores(
        &self,
        run_id: &str,
        transaction_ids: &[String],
        scores: &[f64],
        predictions: &[Label],
    ) -> DetectResult<()> {
        if scores.len() != transaction_ids.len() || predictions.len() != transaction_ids.len() {
            return Err(DetectError::DataShape {
                expected: transaction_ids.len(),
                actual: scores.len().min(predictions.len()),
            });
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO score (run_id, transaction_id, anomaly_score, predicted_anomaly)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for ((id, score), pred) in transaction_ids.iter().zip(scores).zip(predictions) {
                stmt.execute(params![run_id, id, score, *pred as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn predicted_positive_count(&self, run_id: &str) -> DetectResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM score WHERE run_id = ?1 AND predicted_anomaly = 1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Highest-scoring rows, most anomalous first.
    pub fn top_scored(&self, run_id: &str, limit: usize) -> DetectResult<Vec<ScoredRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.transaction_id, t.customer_id, t.amount, t.destination_country,
                    t.timestamp, s.anomaly_score, t.is_anomaly
             FROM score s
             JOIN txn t ON t.run_id = s.run_id AND t.transaction_id = s.transaction_id
             WHERE s.run_id = ?1
             ORDER BY s.anomaly_score DESC, t.transaction_id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![run_id, limit as i64], |row| {
            Ok(ScoredRow {
                transaction_id: row.get(0)?,
                customer_id: row.get(1)?,
                amount: row.get(2)?,
                destination_country: row.get(3)?,
                timestamp: row.get(4)?,
                anomaly_score: row.get(5)?,
                is_anomaly: row.get::<_, i64>(6)? as Label,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Metrics ────────────────────────────────────────────────

    pub fn insert_metrics(&self, run_id: &str, metrics: &EvaluationMetrics) -> DetectResult<()> {
        let json = serde_json::to_string(metrics)?;
        self.conn.execute(
            "INSERT INTO metrics (run_id, metrics_json) VALUES (?1, ?2)",
            params![run_id, json],
        )?;
        Ok(())
    }

    pub fn load_metrics(&self, run_id: &str) -> DetectResult<Option<EvaluationMetrics>> {
        let mut stmt = self.conn.prepare("SELECT metrics_json FROM metrics WHERE run_id = ?1")?;
        let json: Option<String> = stmt
            .query_row(params![run_id], |row| row.get(0))
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(Into::into))
            .transpose()
    }
}
