//! In-memory [`EventStore`] for tests and ephemeral runs.
//!
//! Records live in insertion-ordered `Vec`s behind `std::sync::RwLock`.
//! Timestamps come from the wall clock, so insertion order already matches
//! creation order and listing is a filter over the vectors.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{
    now_timestamp, short_id, EvalRun, NewEvalRun, NewTelemetryEvent, RagResult, RagRun,
    TelemetryEvent,
};

use super::{EventStore, TelemetryQuery, EVENT_ID_LEN, RUN_ID_LEN};

#[derive(Default)]
pub struct InMemoryStore {
    rag_runs: RwLock<Vec<RagRun>>,
    eval_runs: RwLock<Vec<EvalRun>>,
    events: RwLock<Vec<TelemetryEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

fn newest_first<T: Clone>(rows: &[T], limit: i64) -> Vec<T> {
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.iter().rev().take(limit).cloned().collect()
}

#[async_trait]
impl EventStore for InMemoryStore {
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
        self.rag_runs.write().map_err(poisoned)?.push(run.clone());
        Ok(run)
    }

    async fn list_rag_runs(&self, limit: i64) -> Result<Vec<RagRun>> {
        Ok(newest_first(&self.rag_runs.read().map_err(poisoned)?, limit))
    }

    async fn get_rag_run(&self, id: &str) -> Result<Option<RagRun>> {
        let runs = self.rag_runs.read().map_err(poisoned)?;
        Ok(runs.iter().find(|r| r.id == id).cloned())
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
        self.eval_runs.write().map_err(poisoned)?.push(stored.clone());
        Ok(stored)
    }

    async fn list_eval_runs(&self, limit: i64) -> Result<Vec<EvalRun>> {
        Ok(newest_first(&self.eval_runs.read().map_err(poisoned)?, limit))
    }

    async fn get_eval_run(&self, id: &str) -> Result<Option<EvalRun>> {
        let runs = self.eval_runs.read().map_err(poisoned)?;
        Ok(runs.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_telemetry_events(
        &self,
        events: Vec<NewTelemetryEvent>,
    ) -> Result<Vec<TelemetryEvent>> {
        let stored: Vec<TelemetryEvent> = events
            .into_iter()
            .map(|e| TelemetryEvent::from_new(short_id(EVENT_ID_LEN), now_timestamp(), e))
            .collect();
        self.events
            .write()
            .map_err(poisoned)?
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn list_telemetry_events(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryEvent>> {
        let limit = usize::try_from(query.limit).unwrap_or(0);
        let events = self.events.read().map_err(poisoned)?;
        let mut matched: Vec<TelemetryEvent> = events
            .iter()
            .filter(|e| {
                query
                    .scenario_id
                    .as_deref()
                    .map_or(true, |s| e.scenario_id == s)
            })
            .filter(|e| {
                query
                    .since
                    .as_deref()
                    .map_or(true, |since| e.created_at.as_str() >= since)
            })
            .cloned()
            .collect();
        // stable: equal timestamps keep insertion order
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn clear_all(&self) -> Result<()> {
        self.rag_runs.write().map_err(poisoned)?.clear();
        self.eval_runs.write().map_err(poisoned)?.clear();
        self.events.write().map_err(poisoned)?.clear();
        Ok(())
    }
}
