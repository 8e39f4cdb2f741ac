//! Telemetry aggregation pipeline.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ingest`] | Validate single or batched inbound events |
//! | [`window`] | Parse relative windows and pick bucket widths |
//! | [`aggregate`] | Percentiles, windowed summary, bucketed series |
//!
//! [`TelemetrySink`] is the write side used by the engines: a best-effort
//! append whose failures are logged and counted, never returned.

pub mod aggregate;
pub mod ingest;
pub mod window;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::NewTelemetryEvent;
use crate::store::EventStore;

#[derive(Clone)]
pub struct TelemetrySink {
    store: Arc<dyn EventStore>,
    dropped: Arc<AtomicU64>,
}

impl TelemetrySink {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append one event. Returns the assigned id, or `None` if the write
    /// failed.
    pub async fn emit(&self, event: NewTelemetryEvent) -> Option<String> {
        let event_type = event.event_type.clone();
        match self.store.insert_telemetry_events(vec![event]).await {
            Ok(stored) => {
                let id = stored.into_iter().next().map(|e| e.id);
                debug!(event_type = %event_type, id = ?id, "telemetry emitted");
                id
            }
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event_type = %event_type, error = %err, "dropping telemetry event");
                None
            }
        }
    }

    /// Events lost to write failures since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvalRun, NewEvalRun, RagResult, RagRun, TelemetryEvent};
    use crate::store::memory::InMemoryStore;
    use crate::store::TelemetryQuery;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn insert_rag_run(&self, _: &RagResult) -> Result<RagRun> {
            bail!("disk full")
        }
        async fn list_rag_runs(&self, _: i64) -> Result<Vec<RagRun>> {
            bail!("disk full")
        }
        async fn get_rag_run(&self, _: &str) -> Result<Option<RagRun>> {
            bail!("disk full")
        }
        async fn insert_eval_run(&self, _: &NewEvalRun) -> Result<EvalRun> {
            bail!("disk full")
        }
        async fn list_eval_runs(&self, _: i64) -> Result<Vec<EvalRun>> {
            bail!("disk full")
        }
        async fn get_eval_run(&self, _: &str) -> Result<Option<EvalRun>> {
            bail!("disk full")
        }
        async fn insert_telemetry_events(
            &self,
            _: Vec<NewTelemetryEvent>,
        ) -> Result<Vec<TelemetryEvent>> {
            bail!("disk full")
        }
        async fn list_telemetry_events(&self, _: &TelemetryQuery) -> Result<Vec<TelemetryEvent>> {
            bail!("disk full")
        }
        async fn clear_all(&self) -> Result<()> {
            bail!("disk full")
        }
    }

    fn event() -> NewTelemetryEvent {
        NewTelemetryEvent {
            scenario_id: "s".into(),
            run_id: None,
            agent_id: Some("rag".into()),
            event_type: "rag_run".into(),
            latency_ms: Some(1),
            success: true,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_emit_returns_id() {
        let store = Arc::new(InMemoryStore::new());
        let sink = TelemetrySink::new(store.clone());
        let id = sink.emit(event()).await;
        assert!(id.is_some());
        assert_eq!(sink.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_returned() {
        let sink = TelemetrySink::new(Arc::new(BrokenStore));
        assert_eq!(sink.emit(event()).await, None);
        assert_eq!(sink.emit(event()).await, None);
        assert_eq!(sink.dropped_count(), 2);
    }
}
