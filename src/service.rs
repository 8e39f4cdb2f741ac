//! Boundary operations of the lab backend.
//!
//! [`LabService`] wires the retrieval engine, the evaluation simulator,
//! the event store and the best-effort telemetry sink together. Both the
//! HTTP server and the CLI call into it; neither touches the store
//! directly.
//!
//! | Operation | Persists | Emits telemetry |
//! |-----------|----------|-----------------|
//! | [`run_retrieval`](LabService::run_retrieval) | retrieval run | `rag_run` |
//! | [`run_eval`](LabService::run_eval) | evaluation run | `eval_run` |
//! | [`ingest_telemetry`](LabService::ingest_telemetry) | telemetry batch | n/a |
//! | [`telemetry_summary`](LabService::telemetry_summary) | no | no |
//! | [`telemetry_timeseries`](LabService::telemetry_timeseries) | no | no |
//! | [`evaluate_verdict`](LabService::evaluate_verdict) | no | no |
//! | [`reset`](LabService::reset) | wipes everything | no |

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::advisors::{self, InteractionResponse};
use crate::config::{Config, TelemetryConfig};
use crate::corpus::Corpus;
use crate::error::{LabError, LabResult};
use crate::eval::{self, EvalResult};
use crate::models::{
    format_timestamp, Effects, EvalRun, EvalRunSummary, NewEvalRun, NewTelemetryEvent, RagConfig,
    RagResult, RagRun, RagRunSummary, TelemetryEvent,
};
use crate::retrieval::RagEngine;
use crate::store::sqlite::SqliteStore;
use crate::store::{EventStore, TelemetryQuery};
use crate::telemetry::aggregate::{self, Metric, TelemetryPoint, TelemetrySummary};
use crate::telemetry::window::{bucket_seconds, parse_window};
use crate::telemetry::{ingest, TelemetrySink};
use crate::verdict::{self, VerdictRequest, VerdictResponse};

#[derive(Debug, Clone, Deserialize)]
pub struct RagRunRequest {
    pub question: String,
    pub config: RagConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRunResponse {
    pub lines: Vec<String>,
    pub effects: Effects,
    pub rag: RagResult,
    pub run_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRunRequest {
    #[serde(default, alias = "rag_score")]
    pub rag_score: i64,
    #[serde(default, alias = "rag_passed")]
    pub rag_passed: bool,
    #[serde(default, alias = "rag_run_id")]
    pub rag_run_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRunResponse {
    pub lines: Vec<String>,
    pub effects: Effects,
    pub eval: EvalResult,
    pub run_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
    pub wiped: bool,
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn config_json(config: &RagConfig) -> Value {
    serde_json::to_value(config).unwrap_or(Value::Null)
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

struct WindowedEvents {
    scenario: String,
    /// Window as requested, echoed back in summaries.
    window_spec: String,
    span: Duration,
    events: Vec<TelemetryEvent>,
}

pub struct LabService {
    store: Arc<dyn EventStore>,
    engine: RagEngine,
    sink: TelemetrySink,
    telemetry: TelemetryConfig,
}

impl LabService {
    /// Open the SQLite store (creating the schema if needed), load the
    /// corpus, and wire everything up.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(config).await?;
        let corpus = Corpus::load_dir(&config.corpus)?;
        info!(
            documents = corpus.len(),
            root = %config.corpus.root.display(),
            "corpus loaded"
        );

        Ok(Self::new(
            Arc::new(store),
            RagEngine::new(Arc::new(corpus)),
            config.telemetry.clone(),
        ))
    }

    pub fn new(store: Arc<dyn EventStore>, engine: RagEngine, telemetry: TelemetryConfig) -> Self {
        let sink = TelemetrySink::new(store.clone());
        Self {
            store,
            engine,
            sink,
            telemetry,
        }
    }

    pub fn engine(&self) -> &RagEngine {
        &self.engine
    }

    pub fn sink(&self) -> &TelemetrySink {
        &self.sink
    }

    /// Run retrieval, persist the run, then emit a `rag_run` event.
    pub async fn run_retrieval(&self, req: &RagRunRequest) -> LabResult<RagRunResponse> {
        let started = Instant::now();
        let outcome = self.engine.run(&req.question, &req.config)?;
        let run = self.store.insert_rag_run(&outcome.result).await?;
        let rag = outcome.result;

        info!(
            run_id = %run.id,
            score = rag.score,
            passed = rag.passed,
            evidence = outcome.evidence,
            "retrieval run stored"
        );

        let metadata = json!({
            "passed": rag.passed,
            "score": rag.score,
            "citations": rag.citations.len(),
            "sources_used": rag.retrieved.len(),
            "config": config_json(&rag.config),
        });
        self.sink
            .emit(NewTelemetryEvent {
                scenario_id: self.telemetry.default_scenario.clone(),
                run_id: Some(run.id.clone()),
                agent_id: Some("rag".to_string()),
                event_type: "rag_run".to_string(),
                latency_ms: Some(elapsed_ms(started)),
                success: true,
                metadata: into_map(metadata),
            })
            .await;

        Ok(RagRunResponse {
            lines: vec![
                format!(
                    "RAG score {} → {}",
                    rag.score,
                    if rag.passed { "PASS" } else { "FAIL" }
                ),
                String::new(),
                rag.answer.clone(),
            ],
            effects: outcome.effects,
            rag,
            run_id: run.id,
            created_at: run.created_at,
        })
    }

    /// Simulate an evaluation pass, persist it, then emit an `eval_run` event.
    pub async fn run_eval(&self, req: &EvalRunRequest) -> LabResult<EvalRunResponse> {
        let started = Instant::now();
        let result = eval::simulate(req.rag_score, req.rag_passed);

        let run = self
            .store
            .insert_eval_run(&NewEvalRun {
                pass_rate: result.pass_rate,
                failures: result.failures.clone(),
                rag_run_id: req.rag_run_id.clone(),
                rag_score: req.rag_score,
                rag_passed: req.rag_passed,
            })
            .await?;

        info!(run_id = %run.id, pass_rate = result.pass_rate, "eval run stored");

        let metadata = json!({
            "passRate": result.pass_rate,
            "ragRunId": req.rag_run_id,
            "ragScore": req.rag_score,
            "ragPassed": req.rag_passed,
            "failures": result.failures,
        });
        self.sink
            .emit(NewTelemetryEvent {
                scenario_id: self.telemetry.default_scenario.clone(),
                run_id: Some(run.id.clone()),
                agent_id: Some("eval".to_string()),
                event_type: "eval_run".to_string(),
                latency_ms: Some(elapsed_ms(started)),
                success: true,
                metadata: into_map(metadata),
            })
            .await;

        Ok(EvalRunResponse {
            lines: vec![format!("Eval pass rate: {}%", result.pass_rate)],
            effects: eval::effects_for(result.pass_rate),
            eval: result,
            run_id: run.id,
            created_at: run.created_at,
        })
    }

    fn list_limit(&self, limit: Option<i64>) -> LabResult<i64> {
        let limit = limit.unwrap_or(self.telemetry.default_list_limit);
        if limit < 1 {
            return Err(LabError::validation(format!(
                "limit must be >= 1 (got {})",
                limit
            )));
        }
        Ok(limit.min(self.telemetry.max_list_limit))
    }

    pub async fn list_rag_runs(&self, limit: Option<i64>) -> LabResult<Vec<RagRunSummary>> {
        let runs = self.store.list_rag_runs(self.list_limit(limit)?).await?;
        Ok(runs.iter().map(RagRunSummary::from).collect())
    }

    pub async fn list_eval_runs(&self, limit: Option<i64>) -> LabResult<Vec<EvalRunSummary>> {
        let runs = self.store.list_eval_runs(self.list_limit(limit)?).await?;
        Ok(runs.iter().map(EvalRunSummary::from).collect())
    }

    pub async fn get_rag_run(&self, id: &str) -> LabResult<RagRun> {
        self.store
            .get_rag_run(id)
            .await?
            .ok_or_else(|| LabError::not_found(format!("rag run '{}'", id)))
    }

    pub async fn get_eval_run(&self, id: &str) -> LabResult<EvalRun> {
        self.store
            .get_eval_run(id)
            .await?
            .ok_or_else(|| LabError::not_found(format!("eval run '{}'", id)))
    }

    /// Validate a single event or a batch and append it atomically.
    pub async fn ingest_telemetry(&self, payload: Value) -> LabResult<IngestResponse> {
        let events = ingest::parse_batch(payload, &self.telemetry.default_scenario)?;
        let stored = self.store.insert_telemetry_events(events).await?;
        let ids: Vec<String> = stored.into_iter().map(|e| e.id).collect();
        info!(count = ids.len(), "telemetry ingested");
        Ok(IngestResponse { ok: true, ids })
    }

    /// Resolve scenario and window defaults and fetch the events inside
    /// the window.
    async fn windowed_events(
        &self,
        scenario_id: Option<&str>,
        window: Option<&str>,
        limit: i64,
    ) -> LabResult<WindowedEvents> {
        let scenario = scenario_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.telemetry.default_scenario)
            .to_string();
        let window_spec = window
            .unwrap_or(&self.telemetry.default_window)
            .to_string();
        let span = parse_window(&window_spec);
        let since = Utc::now()
            .checked_sub_signed(span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let events = self
            .store
            .list_telemetry_events(&TelemetryQuery {
                scenario_id: Some(scenario.clone()),
                since: Some(format_timestamp(since)),
                limit,
            })
            .await?;
        Ok(WindowedEvents {
            scenario,
            window_spec,
            span,
            events,
        })
    }

    pub async fn telemetry_summary(
        &self,
        scenario_id: Option<&str>,
        window: Option<&str>,
    ) -> LabResult<TelemetrySummary> {
        let w = self
            .windowed_events(scenario_id, window, self.telemetry.summary_limit)
            .await?;
        Ok(aggregate::summarize(&w.scenario, &w.window_spec, &w.events))
    }

    pub async fn telemetry_timeseries(
        &self,
        metric: &str,
        scenario_id: Option<&str>,
        window: Option<&str>,
    ) -> LabResult<Vec<TelemetryPoint>> {
        let metric: Metric = metric.parse().map_err(LabError::Validation)?;
        let w = self
            .windowed_events(scenario_id, window, self.telemetry.timeseries_limit)
            .await?;
        Ok(aggregate::timeseries(metric, &w.events, bucket_seconds(w.span)))
    }

    pub fn evaluate_verdict(&self, req: &VerdictRequest) -> VerdictResponse {
        verdict::evaluate(req)
    }

    pub fn advisor(&self, key: &str) -> LabResult<InteractionResponse> {
        advisors::find(key)
            .map(|a| a.interaction())
            .ok_or_else(|| LabError::not_found(format!("agent '{}'", key)))
    }

    pub async fn reset(&self, wipe: bool) -> LabResult<ResetResponse> {
        if !wipe {
            return Ok(ResetResponse {
                ok: true,
                wiped: false,
            });
        }
        warn!("wiping all runs and telemetry");
        self.store.clear_all().await?;
        Ok(ResetResponse {
            ok: true,
            wiped: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkSize, Meters};
    use crate::store::memory::InMemoryStore;

    fn corpus() -> Corpus {
        Corpus::from_documents(vec![
            Corpus::document(
                "restart_policy",
                "# Restart Policy\n\nNever restart a tripped circuit automatically.\n\n\
                 Confirm the circuit location and verify relay state before any restart.",
            ),
            Corpus::document(
                "escalation",
                "# Escalation\n\nEscalate to the duty engineer when circuit context is missing.",
            ),
        ])
    }

    fn service() -> (Arc<InMemoryStore>, LabService) {
        let store = Arc::new(InMemoryStore::new());
        let engine = RagEngine::new(Arc::new(corpus()));
        let svc = LabService::new(store.clone(), engine, TelemetryConfig::default());
        (store, svc)
    }

    fn rag_request(top_k: i64) -> RagRunRequest {
        RagRunRequest {
            question: "Should we restart the tripped circuit? Verify relay state and location."
                .to_string(),
            config: RagConfig {
                chunk_size: ChunkSize::Small,
                top_k,
                require_citations: true,
            },
        }
    }

    async fn all_events(store: &InMemoryStore) -> Vec<TelemetryEvent> {
        store
            .list_telemetry_events(&TelemetryQuery {
                scenario_id: None,
                since: None,
                limit: 1_000,
            })
            .await
            .unwrap()
    }

    /// Delegates to an in-memory store but fails the chosen writes.
    struct FlakyStore {
        inner: InMemoryStore,
        fail_telemetry: bool,
        fail_runs: bool,
    }

    impl FlakyStore {
        fn new(fail_telemetry: bool, fail_runs: bool) -> Self {
            Self {
                inner: InMemoryStore::new(),
                fail_telemetry,
                fail_runs,
            }
        }
    }

    #[async_trait::async_trait]
    impl EventStore for FlakyStore {
        async fn insert_rag_run(&self, result: &RagResult) -> anyhow::Result<RagRun> {
            if self.fail_runs {
                anyhow::bail!("disk full");
            }
            self.inner.insert_rag_run(result).await
        }
        async fn list_rag_runs(&self, limit: i64) -> anyhow::Result<Vec<RagRun>> {
            self.inner.list_rag_runs(limit).await
        }
        async fn get_rag_run(&self, id: &str) -> anyhow::Result<Option<RagRun>> {
            self.inner.get_rag_run(id).await
        }
        async fn insert_eval_run(&self, run: &NewEvalRun) -> anyhow::Result<EvalRun> {
            if self.fail_runs {
                anyhow::bail!("disk full");
            }
            self.inner.insert_eval_run(run).await
        }
        async fn list_eval_runs(&self, limit: i64) -> anyhow::Result<Vec<EvalRun>> {
            self.inner.list_eval_runs(limit).await
        }
        async fn get_eval_run(&self, id: &str) -> anyhow::Result<Option<EvalRun>> {
            self.inner.get_eval_run(id).await
        }
        async fn insert_telemetry_events(
            &self,
            events: Vec<NewTelemetryEvent>,
        ) -> anyhow::Result<Vec<TelemetryEvent>> {
            if self.fail_telemetry {
                anyhow::bail!("telemetry table locked");
            }
            self.inner.insert_telemetry_events(events).await
        }
        async fn list_telemetry_events(
            &self,
            query: &TelemetryQuery,
        ) -> anyhow::Result<Vec<TelemetryEvent>> {
            self.inner.list_telemetry_events(query).await
        }
        async fn clear_all(&self) -> anyhow::Result<()> {
            self.inner.clear_all().await
        }
    }

    fn flaky_service(store: &Arc<FlakyStore>) -> LabService {
        let engine = RagEngine::new(Arc::new(corpus()));
        LabService::new(store.clone(), engine, TelemetryConfig::default())
    }

    #[tokio::test]
    async fn test_retrieval_persists_and_emits() {
        let (store, svc) = service();
        let resp = svc.run_retrieval(&rag_request(3)).await.unwrap();

        assert_eq!(resp.run_id.len(), 12);
        assert_eq!(resp.lines.len(), 3);
        assert!(resp.lines[0].starts_with(&format!("RAG score {} → ", resp.rag.score)));
        assert_eq!(resp.lines[2], resp.rag.answer);

        let stored = svc.get_rag_run(&resp.run_id).await.unwrap();
        assert_eq!(stored.created_at, resp.created_at);
        assert_eq!(stored.citations, resp.rag.citations);

        let events = all_events(&store).await;
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.event_type, "rag_run");
        assert_eq!(e.agent_id.as_deref(), Some("rag"));
        assert_eq!(e.run_id.as_deref(), Some(resp.run_id.as_str()));
        assert_eq!(e.scenario_id, crate::config::DEFAULT_SCENARIO_ID);
        assert_eq!(e.metadata["citations"], resp.rag.citations.len());
        assert_eq!(e.metadata["config"]["topK"], 3);
    }

    #[tokio::test]
    async fn test_invalid_config_persists_nothing() {
        let (store, svc) = service();
        let err = svc.run_retrieval(&rag_request(0)).await.unwrap_err();
        assert!(matches!(err, LabError::Validation(_)));
        assert!(store.list_rag_runs(10).await.unwrap().is_empty());
        assert!(all_events(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_eval_defaults_and_telemetry() {
        let (store, svc) = service();
        let resp = svc.run_eval(&EvalRunRequest::default()).await.unwrap();
        // 55 + floor((0 - 55) / 2)
        assert_eq!(resp.eval.pass_rate, 27);
        assert!(resp.eval.ran);
        assert_eq!(resp.eval.failures.len(), 1);
        assert_eq!(resp.lines, vec!["Eval pass rate: 27%".to_string()]);
        assert_eq!(resp.effects.reliability, -2);

        let events = all_events(&store).await;
        assert_eq!(events[0].event_type, "eval_run");
        assert_eq!(events[0].metadata["passRate"], 27);
        assert_eq!(events[0].metadata["ragRunId"], Value::Null);

        let listed = svc.list_eval_runs(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, resp.run_id);
    }

    #[tokio::test]
    async fn test_list_limit_rules() {
        let (_, svc) = service();
        for _ in 0..3 {
            svc.run_eval(&EvalRunRequest::default()).await.unwrap();
        }
        assert_eq!(svc.list_eval_runs(Some(2)).await.unwrap().len(), 2);
        assert_eq!(svc.list_eval_runs(Some(10_000)).await.unwrap().len(), 3);
        assert!(matches!(
            svc.list_eval_runs(Some(0)).await,
            Err(LabError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_run_and_agent_are_not_found() {
        let (_, svc) = service();
        assert!(matches!(
            svc.get_rag_run("nope").await,
            Err(LabError::NotFound(_))
        ));
        assert!(matches!(
            svc.get_eval_run("nope").await,
            Err(LabError::NotFound(_))
        ));
        assert!(matches!(svc.advisor("janitor"), Err(LabError::NotFound(_))));
        assert!(svc.advisor("securityadvisor").is_ok());
    }

    #[tokio::test]
    async fn test_ingest_batch_then_summarize() {
        let (_, svc) = service();
        let resp = svc
            .ingest_telemetry(json!([
                {"eventType": "response", "latencyMs": 100, "metadata": {"citations": 1}},
                {"eventType": "escalation", "latencyMs": 300},
                {"eventType": "tool_call", "success": false},
            ]))
            .await
            .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.ids.len(), 3);

        let summary = svc.telemetry_summary(None, Some("1h")).await.unwrap();
        assert_eq!(summary.window, "1h");
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.latency_p50, Some(100));
        assert_eq!(summary.latency_p95, Some(300));
        assert!((summary.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.citation_coverage, 1.0);

        let other = svc
            .telemetry_summary(Some("another-scenario"), None)
            .await
            .unwrap();
        assert_eq!(other.total_events, 0);
        assert_eq!(other.window, "24h");
    }

    #[tokio::test]
    async fn test_rejected_batch_stores_nothing() {
        let (store, svc) = service();
        let err = svc
            .ingest_telemetry(json!([{"eventType": "a"}, {}, {"eventType": "c"}]))
            .await
            .unwrap_err();
        assert!(matches!(err, LabError::Validation(_)));
        assert!(all_events(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeseries_metric_validation() {
        let (_, svc) = service();
        svc.ingest_telemetry(json!({"eventType": "x", "latencyMs": 40}))
            .await
            .unwrap();
        let points = svc
            .telemetry_timeseries("latency", None, Some("1h"))
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 40.0);

        assert!(matches!(
            svc.telemetry_timeseries("throughput", None, None).await,
            Err(LabError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_verdict_passthrough() {
        let (_, svc) = service();
        let resp = svc.evaluate_verdict(&VerdictRequest {
            consulted_count: 4,
            rag_passed: true,
            eval_pass_rate: 85,
            meters: Meters {
                reliability: 60,
                cost: 0,
                risk: 10,
                reg_heat: 10,
            },
        });
        assert_eq!(resp.verdict, verdict::Verdict::Ship);
        assert!(resp.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_reset() {
        let (store, svc) = service();
        svc.run_eval(&EvalRunRequest::default()).await.unwrap();

        let kept = svc.reset(false).await.unwrap();
        assert!(!kept.wiped);
        assert_eq!(store.list_eval_runs(10).await.unwrap().len(), 1);

        let wiped = svc.reset(true).await.unwrap();
        assert!(wiped.wiped);
        assert!(store.list_eval_runs(10).await.unwrap().is_empty());
        assert!(all_events(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_telemetry_failure_leaves_response_intact() {
        let store = Arc::new(FlakyStore::new(true, false));
        let svc = flaky_service(&store);

        let rag = svc.run_retrieval(&rag_request(3)).await.unwrap();
        assert_eq!(svc.sink().dropped_count(), 1);
        assert_eq!(svc.get_rag_run(&rag.run_id).await.unwrap().score, rag.rag.score);

        let eval = svc
            .run_eval(&EvalRunRequest {
                rag_score: rag.rag.score,
                rag_passed: rag.rag.passed,
                rag_run_id: Some(rag.run_id.clone()),
            })
            .await
            .unwrap();
        assert_eq!(svc.sink().dropped_count(), 2);
        let stored = svc.get_eval_run(&eval.run_id).await.unwrap();
        assert_eq!(stored.pass_rate, eval.eval.pass_rate);
        assert_eq!(stored.rag_run_id.as_deref(), Some(rag.run_id.as_str()));

        // same answer as with a healthy store
        let (_, healthy) = service();
        let baseline = healthy.run_retrieval(&rag_request(3)).await.unwrap();
        assert_eq!(rag.lines, baseline.lines);
        assert_eq!(rag.rag.citations, baseline.rag.citations);
    }

    #[tokio::test]
    async fn test_primary_write_failure_is_storage_error() {
        let store = Arc::new(FlakyStore::new(false, true));
        let svc = flaky_service(&store);

        let err = svc.run_retrieval(&rag_request(3)).await.unwrap_err();
        assert!(matches!(err, LabError::Storage(_)), "{}", err);
        assert_eq!(err.code(), "internal");

        let err = svc.run_eval(&EvalRunRequest::default()).await.unwrap_err();
        assert!(matches!(err, LabError::Storage(_)), "{}", err);

        assert!(store.inner.list_rag_runs(10).await.unwrap().is_empty());
        assert!(all_events(&store.inner).await.is_empty());
        assert_eq!(svc.sink().dropped_count(), 0);
    }
}
