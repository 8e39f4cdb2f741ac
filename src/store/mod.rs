//! Storage abstraction for the lab backend.
//!
//! The [`EventStore`] trait is the append-only persistence contract for
//! the three record kinds: retrieval runs, evaluation runs, and telemetry
//! events. The store assigns identifiers and creation timestamps; records
//! are never updated afterwards. The only destructive operation is
//! [`clear_all`](EventStore::clear_all).
//!
//! Two backends ship with the crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`sqlite::SqliteStore`] | the server and CLI (sqlx + SQLite, WAL) |
//! | [`memory::InMemoryStore`] | unit tests and ephemeral runs |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EvalRun, NewEvalRun, NewTelemetryEvent, RagResult, RagRun, TelemetryEvent};

/// Identifier length for retrieval and evaluation runs.
pub const RUN_ID_LEN: usize = 12;
/// Identifier length for telemetry events.
pub const EVENT_ID_LEN: usize = 16;

/// Filter for [`EventStore::list_telemetry_events`].
///
/// Results are ordered by creation time ascending, with insertion order
/// breaking ties, and capped at `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryQuery {
    pub scenario_id: Option<String>,
    /// Inclusive lower bound, as a store timestamp string.
    pub since: Option<String>,
    pub limit: i64,
}

/// Append-only event store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_rag_run`](EventStore::insert_rag_run) | Persist a retrieval result |
/// | [`list_rag_runs`](EventStore::list_rag_runs) | Newest retrieval runs first |
/// | [`get_rag_run`](EventStore::get_rag_run) | One retrieval run by id |
/// | [`insert_eval_run`](EventStore::insert_eval_run) | Persist an evaluation result |
/// | [`list_eval_runs`](EventStore::list_eval_runs) | Newest evaluation runs first |
/// | [`get_eval_run`](EventStore::get_eval_run) | One evaluation run by id |
/// | [`insert_telemetry_events`](EventStore::insert_telemetry_events) | Append a batch, all or nothing |
/// | [`list_telemetry_events`](EventStore::list_telemetry_events) | Filtered, time-ordered read |
/// | [`clear_all`](EventStore::clear_all) | Wipe every record, leave an empty usable schema |
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_rag_run(&self, result: &RagResult) -> Result<RagRun>;

    async fn list_rag_runs(&self, limit: i64) -> Result<Vec<RagRun>>;

    async fn get_rag_run(&self, id: &str) -> Result<Option<RagRun>>;

    async fn insert_eval_run(&self, run: &NewEvalRun) -> Result<EvalRun>;

    async fn list_eval_runs(&self, limit: i64) -> Result<Vec<EvalRun>>;

    async fn get_eval_run(&self, id: &str) -> Result<Option<EvalRun>>;

    /// Append events in order. Either every event is stored or none is.
    async fn insert_telemetry_events(
        &self,
        events: Vec<NewTelemetryEvent>,
    ) -> Result<Vec<TelemetryEvent>>;

    async fn list_telemetry_events(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryEvent>>;

    async fn clear_all(&self) -> Result<()>;
}
