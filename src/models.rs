//! Core data models used throughout the lab backend.
//!
//! These are the records persisted by the event store (retrieval runs,
//! evaluation runs, telemetry events) plus the small value types that flow
//! between the engines. JSON field names use the camelCase wire casing the
//! game frontend speaks.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reference document, loaded once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub text: String,
}

/// Chunking granularity for the retrieval engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSize {
    Small,
    Medium,
    Large,
}

impl ChunkSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkSize::Small => "small",
            ChunkSize::Medium => "medium",
            ChunkSize::Large => "large",
        }
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(ChunkSize::Small),
            "medium" => Ok(ChunkSize::Medium),
            "large" => Ok(ChunkSize::Large),
            other => Err(format!(
                "unknown chunk size '{}': use small, medium, or large",
                other
            )),
        }
    }
}

/// Retrieval knobs chosen by the player at the RAG test rig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagConfig {
    #[serde(alias = "chunk_size")]
    pub chunk_size: ChunkSize,
    #[serde(alias = "top_k")]
    pub top_k: i64,
    #[serde(alias = "require_citations")]
    pub require_citations: bool,
}

/// One selected chunk as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Citation id, `"{documentId}:{rank}"`.
    pub id: String,
    pub title: String,
    pub snippet: String,
}

/// Outcome of one retrieval-and-scoring pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResult {
    pub passed: bool,
    pub score: i64,
    pub answer: String,
    pub citations: Vec<String>,
    pub retrieved: Vec<RetrievedChunk>,
    pub config: RagConfig,
}

/// A persisted retrieval run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRun {
    pub id: String,
    pub created_at: String,
    pub passed: bool,
    pub score: i64,
    pub config: RagConfig,
    pub answer: String,
    pub citations: Vec<String>,
    pub retrieved: Vec<RetrievedChunk>,
}

/// Listing row for retrieval runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRunSummary {
    pub id: String,
    pub created_at: String,
    pub passed: bool,
    pub score: i64,
    pub config: RagConfig,
}

impl From<&RagRun> for RagRunSummary {
    fn from(run: &RagRun) -> Self {
        Self {
            id: run.id.clone(),
            created_at: run.created_at.clone(),
            passed: run.passed,
            score: run.score,
            config: run.config.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalFailure {
    pub id: String,
    pub reason: String,
}

/// Evaluation run before the store assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvalRun {
    pub pass_rate: i64,
    pub failures: Vec<EvalFailure>,
    pub rag_run_id: Option<String>,
    pub rag_score: i64,
    pub rag_passed: bool,
}

/// A persisted evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRun {
    pub id: String,
    pub created_at: String,
    pub pass_rate: i64,
    pub failures: Vec<EvalFailure>,
    pub rag_run_id: Option<String>,
    pub rag_score: i64,
    pub rag_passed: bool,
}

/// Listing row for evaluation runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRunSummary {
    pub id: String,
    pub created_at: String,
    pub pass_rate: i64,
    pub rag_run_id: Option<String>,
    pub rag_score: i64,
    pub rag_passed: bool,
}

impl From<&EvalRun> for EvalRunSummary {
    fn from(run: &EvalRun) -> Self {
        Self {
            id: run.id.clone(),
            created_at: run.created_at.clone(),
            pass_rate: run.pass_rate,
            rag_run_id: run.rag_run_id.clone(),
            rag_score: run.rag_score,
            rag_passed: run.rag_passed,
        }
    }
}

/// A validated telemetry event waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTelemetryEvent {
    pub scenario_id: String,
    pub run_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_type: String,
    pub latency_ms: Option<i64>,
    pub success: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// An appended telemetry event. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub id: String,
    pub created_at: String,
    pub scenario_id: String,
    pub run_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_type: String,
    pub latency_ms: Option<i64>,
    pub success: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TelemetryEvent {
    pub fn from_new(id: String, created_at: String, event: NewTelemetryEvent) -> Self {
        Self {
            id,
            created_at,
            scenario_id: event.scenario_id,
            run_id: event.run_id,
            agent_id: event.agent_id,
            event_type: event.event_type,
            latency_ms: event.latency_ms,
            success: event.success,
            metadata: event.metadata,
        }
    }
}

/// Game meter deltas produced by an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effects {
    #[serde(default)]
    pub reliability: i64,
    #[serde(default)]
    pub cost: i64,
    #[serde(default)]
    pub risk: i64,
    #[serde(default)]
    pub reg_heat: i64,
}

/// Accumulated game meters as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meters {
    pub reliability: i64,
    pub cost: i64,
    pub risk: i64,
    #[serde(alias = "reg_heat")]
    pub reg_heat: i64,
}

/// Which run table a listing or lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Rag,
    Eval,
}

impl FromStr for RunKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rag" => Ok(RunKind::Rag),
            "eval" => Ok(RunKind::Eval),
            other => Err(format!("unknown run kind '{}': use rag or eval", other)),
        }
    }
}

/// Fixed-width RFC 3339 UTC timestamp; lexical order equals time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Short opaque identifier: the first `len` hex digits of a random UUID.
pub fn short_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_config_accepts_both_casings() {
        let camel: RagConfig =
            serde_json::from_str(r#"{"chunkSize":"medium","topK":3,"requireCitations":true}"#)
                .unwrap();
        let snake: RagConfig =
            serde_json::from_str(r#"{"chunk_size":"medium","top_k":3,"require_citations":true}"#)
                .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(
            serde_json::to_value(&camel).unwrap(),
            serde_json::json!({"chunkSize":"medium","topK":3,"requireCitations":true})
        );
    }

    #[test]
    fn test_effects_wire_names() {
        let e = Effects {
            reliability: 3,
            cost: 1,
            risk: -3,
            reg_heat: -2,
        };
        let v = serde_json::to_value(e).unwrap();
        assert_eq!(v["regHeat"], -2);
    }

    #[test]
    fn test_timestamps_are_fixed_width_and_round_trip() {
        let a = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let b = chrono::DateTime::from_timestamp(1_700_000_000, 123_000).unwrap();
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fb), Some(b));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_short_id_length() {
        assert_eq!(short_id(12).len(), 12);
        assert_ne!(short_id(16), short_id(16));
    }
}
