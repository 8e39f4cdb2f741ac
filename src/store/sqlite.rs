//! SQLite-backed [`EventStore`].
//!
//! Wraps a [`SqlitePool`]. Every run insert is a single statement; a
//! telemetry batch is inserted inside one transaction so a failure part
//! way through leaves nothing behind.
//!
//! The server and the CLI may write to the same file at once, so the
//! database runs in WAL mode and writers wait on a busy lock instead of
//! failing with `SQLITE_BUSY`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::time::Duration;

use crate::config::Config;
use crate::migrate;
use crate::models::{
    now_timestamp, short_id, EvalRun, NewEvalRun, NewTelemetryEvent, RagResult, RagRun,
    TelemetryEvent,
};

use super::{EventStore, TelemetryQuery, EVENT_ID_LEN, RUN_ID_LEN};

pub struct SqliteStore {
    pool: SqlitePool,
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `[db].path` and ensure the
    /// schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = &config.db.path;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        migrate::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn rag_run_from_row(row: &SqliteRow) -> Result<RagRun> {
    let id: String = row.get("id");
    let config_json: String = row.get("config_json");
    let citations_json: String = row.get("citations_json");
    let retrieved_json: String = row.get("retrieved_json");

    Ok(RagRun {
        config: serde_json::from_str(&config_json)
            .with_context(|| format!("corrupt config_json for rag run {}", id))?,
        citations: serde_json::from_str(&citations_json)
            .with_context(|| format!("corrupt citations_json for rag run {}", id))?,
        retrieved: serde_json::from_str(&retrieved_json)
            .with_context(|| format!("corrupt retrieved_json for rag run {}", id))?,
        created_at: row.get("created_at"),
        passed: row.get("passed"),
        score: row.get("score"),
        answer: row.get("answer"),
        id,
    })
}

fn eval_run_from_row(row: &SqliteRow) -> Result<EvalRun> {
    let id: String = row.get("id");
    let failures_json: String = row.get("failures_json");

    Ok(EvalRun {
        failures: serde_json::from_str(&failures_json)
            .with_context(|| format!("corrupt failures_json for eval run {}", id))?,
        created_at: row.get("created_at"),
        pass_rate: row.get("pass_rate"),
        rag_run_id: row.get("rag_run_id"),
        rag_score: row.get("rag_score"),
        rag_passed: row.get("rag_passed"),
        id,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<TelemetryEvent> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("corrupt metadata_json for telemetry event {}", id))?;

    Ok(TelemetryEvent {
        id,
        created_at: row.get("created_at"),
        scenario_id: row.get("scenario_id"),
        run_id: row.get("run_id"),
        agent_id: row.get("agent_id"),
        event_type: row.get("event_type"),
        latency_ms: row.get("latency_ms"),
        success: row.get("success"),
        metadata,
    })
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert_rag_run(&self, result: &RagResult) -> Result<RagRun> {
        let run = RagRun {
            id: short_id(RUN_ID_LEN),
            created_at: now_timestamp(),
            passed: result.passed,
            score: result.score,
            config: result.config.clone(),
            answer: result.answer.clone(),
            citations: result.citations.clone(),
            retrieved: result.retrieved.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO rag_runs (id, created_at, passed, score, config_json, answer,
                                  citations_json, retrieved_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.created_at)
        .bind(run.passed)
        .bind(run.score)
        .bind(serde_json::to_string(&run.config)?)
        .bind(&run.answer)
        .bind(serde_json::to_string(&run.citations)?)
        .bind(serde_json::to_string(&run.retrieved)?)
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    async fn list_rag_runs(&self, limit: i64) -> Result<Vec<RagRun>> {
        let rows = sqlx::query(
            "SELECT * FROM rag_runs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rag_run_from_row).collect()
    }

    async fn get_rag_run(&self, id: &str) -> Result<Option<RagRun>> {
        let row = sqlx::query("SELECT * FROM rag_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(rag_run_from_row).transpose()
    }

    async fn insert_eval_run(&self, run: &NewEvalRun) -> Result<EvalRun> {
        let stored = EvalRun {
            id: short_id(RUN_ID_LEN),
            created_at: now_timestamp(),
            pass_rate: run.pass_rate,
            failures: run.failures.clone(),
            rag_run_id: run.rag_run_id.clone(),
            rag_score: run.rag_score,
            rag_passed: run.rag_passed,
        };

        sqlx::query(
            r#"
            INSERT INTO eval_runs (id, created_at, pass_rate, failures_json, rag_run_id,
                                   rag_score, rag_passed)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.created_at)
        .bind(stored.pass_rate)
        .bind(serde_json::to_string(&stored.failures)?)
        .bind(&stored.rag_run_id)
        .bind(stored.rag_score)
        .bind(stored.rag_passed)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn list_eval_runs(&self, limit: i64) -> Result<Vec<EvalRun>> {
        let rows = sqlx::query(
            "SELECT * FROM eval_runs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(eval_run_from_row).collect()
    }

    async fn get_eval_run(&self, id: &str) -> Result<Option<EvalRun>> {
        let row = sqlx::query("SELECT * FROM eval_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(eval_run_from_row).transpose()
    }

    async fn insert_telemetry_events(
        &self,
        events: Vec<NewTelemetryEvent>,
    ) -> Result<Vec<TelemetryEvent>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(events.len());

        for event in events {
            let event = TelemetryEvent::from_new(short_id(EVENT_ID_LEN), now_timestamp(), event);
            sqlx::query(
                r#"
                INSERT INTO telemetry_events (id, created_at, scenario_id, run_id, agent_id,
                                              event_type, latency_ms, success, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.id)
            .bind(&event.created_at)
            .bind(&event.scenario_id)
            .bind(&event.run_id)
            .bind(&event.agent_id)
            .bind(&event.event_type)
            .bind(event.latency_ms)
            .bind(event.success)
            .bind(serde_json::to_string(&event.metadata)?)
            .execute(&mut *tx)
            .await?;
            stored.push(event);
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_telemetry_events(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM telemetry_events
            WHERE (?1 IS NULL OR scenario_id = ?1)
              AND (?2 IS NULL OR created_at >= ?2)
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?3
            "#,
        )
        .bind(&query.scenario_id)
        .bind(&query.since)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["rag_runs", "eval_runs", "telemetry_events"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        migrate::ensure_schema(&self.pool).await?;
        Ok(())
    }
}
