//! Idempotent schema creation for the event store.
//!
//! Three append-only tables, one per record kind. JSON-shaped fields are
//! stored as text columns. Timestamps are fixed-width RFC 3339 strings, so
//! `ORDER BY created_at, rowid` yields creation order with insertion order
//! as the tie-break.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::store::sqlite::SqliteStore;

/// Create the database file and schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    SqliteStore::open(config).await?.close().await;
    Ok(())
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rag_runs (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            passed INTEGER NOT NULL,
            score INTEGER NOT NULL,
            config_json TEXT NOT NULL,
            answer TEXT NOT NULL,
            citations_json TEXT NOT NULL,
            retrieved_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS eval_runs (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            pass_rate INTEGER NOT NULL,
            failures_json TEXT NOT NULL,
            rag_run_id TEXT,
            rag_score INTEGER NOT NULL,
            rag_passed INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry_events (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            scenario_id TEXT NOT NULL,
            run_id TEXT,
            agent_id TEXT,
            event_type TEXT NOT NULL,
            latency_ms INTEGER,
            success INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_runs_created_at ON rag_runs(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_eval_runs_created_at ON eval_runs(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_telemetry_scenario_time ON telemetry_events(scenario_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
