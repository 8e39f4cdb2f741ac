//! Windowed summaries and bucketed series over telemetry events.
//!
//! Both entry points are pure functions over an already-fetched,
//! time-ordered slice of events; [`crate::service`] does the store query.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat};

use crate::models::{parse_timestamp, TelemetryEvent};

/// Nearest-rank percentile: the sorted value at `round(p/100 * (n-1))`.
///
/// Halfway ranks round to even. Returns `None` for an empty input.
pub fn percentile(values: &[i64], p: f64) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let last = sorted.len() - 1;
    let rank = ((p / 100.0) * last as f64).round_ties_even();
    let idx = if rank.is_nan() || rank < 0.0 {
        0
    } else {
        (rank as usize).min(last)
    };
    Some(sorted[idx])
}

fn metadata<'a>(event: &'a TelemetryEvent, key: &str) -> Option<&'a Value> {
    event.metadata.get(key)
}

/// Interpret a metadata count loosely: numbers, numeric strings, booleans,
/// and arrays (by length). Anything else counts as zero.
fn metadata_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        Value::Array(items) => items.len() as i64,
        _ => 0,
    }
}

/// An escalation event, or any event flagged `metadata.escalated == true`.
pub fn is_escalation(event: &TelemetryEvent) -> bool {
    event.event_type == "escalation" || metadata(event, "escalated") == Some(&Value::Bool(true))
}

/// For answer-bearing events that report citations, whether any were given.
pub fn citation_covered(event: &TelemetryEvent) -> Option<bool> {
    if event.event_type != "rag_run" && event.event_type != "response" {
        return None;
    }
    metadata(event, "citations").map(|v| metadata_count(v) > 0)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySummary {
    pub scenario_id: String,
    pub window: String,
    pub latency_p50: Option<i64>,
    pub latency_p95: Option<i64>,
    pub error_rate: f64,
    pub escalation_rate: f64,
    pub citation_coverage: f64,
    pub total_events: usize,
}

pub fn summarize(scenario_id: &str, window: &str, events: &[TelemetryEvent]) -> TelemetrySummary {
    let latencies: Vec<i64> = events.iter().filter_map(|e| e.latency_ms).collect();
    let total = events.len();
    let errors = events.iter().filter(|e| !e.success).count();
    let escalations = events.iter().filter(|e| is_escalation(e)).count();

    let citation_samples: Vec<bool> = events.iter().filter_map(citation_covered).collect();
    let covered = citation_samples.iter().filter(|c| **c).count();

    TelemetrySummary {
        scenario_id: scenario_id.to_string(),
        window: window.to_string(),
        latency_p50: percentile(&latencies, 50.0),
        latency_p95: percentile(&latencies, 95.0),
        error_rate: ratio(errors, total),
        escalation_rate: ratio(escalations, total),
        citation_coverage: ratio(covered, citation_samples.len()),
        total_events: total,
    }
}

/// Chartable metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Latency,
    LatencyP50,
    LatencyP95,
    ErrorRate,
    EscalationRate,
    CitationCoverage,
    EvalPassRate,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Latency,
        Metric::LatencyP50,
        Metric::LatencyP95,
        Metric::ErrorRate,
        Metric::EscalationRate,
        Metric::CitationCoverage,
        Metric::EvalPassRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Latency => "latency",
            Metric::LatencyP50 => "latency_p50",
            Metric::LatencyP95 => "latency_p95",
            Metric::ErrorRate => "error_rate",
            Metric::EscalationRate => "escalation_rate",
            Metric::CitationCoverage => "citation_coverage",
            Metric::EvalPassRate => "eval_pass_rate",
        }
    }

    /// The sample an event contributes to this metric, if any.
    fn sample(&self, event: &TelemetryEvent) -> Option<f64> {
        match self {
            Metric::Latency | Metric::LatencyP50 | Metric::LatencyP95 => {
                event.latency_ms.map(|ms| ms as f64)
            }
            Metric::ErrorRate => Some(if event.success { 0.0 } else { 1.0 }),
            Metric::EscalationRate => Some(if is_escalation(event) { 1.0 } else { 0.0 }),
            Metric::CitationCoverage => {
                citation_covered(event).map(|c| if c { 1.0 } else { 0.0 })
            }
            Metric::EvalPassRate => {
                if event.event_type != "eval_run" {
                    return None;
                }
                metadata(event, "passRate").and_then(Value::as_f64)
            }
        }
    }

    fn reduce(&self, samples: &[f64]) -> f64 {
        let pct = match self {
            Metric::LatencyP50 => Some(50.0),
            Metric::LatencyP95 => Some(95.0),
            _ => None,
        };
        match pct {
            Some(p) => {
                let ints: Vec<i64> = samples.iter().map(|s| *s as i64).collect();
                percentile(&ints, p).unwrap_or(0) as f64
            }
            None => samples.iter().sum::<f64>() / samples.len() as f64,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(Metric::as_str).collect();
                format!("unknown metric '{}': use one of {}", s, known.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPoint {
    /// Bucket start, RFC 3339 UTC.
    pub timestamp: String,
    pub value: f64,
}

/// Bucket events into fixed-width intervals and reduce each non-empty
/// bucket to one point, in ascending time order. Events whose timestamp
/// does not parse are skipped.
pub fn timeseries(metric: Metric, events: &[TelemetryEvent], bucket_secs: i64) -> Vec<TelemetryPoint> {
    let bucket_secs = bucket_secs.max(1);
    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();

    for event in events {
        let Some(ts) = parse_timestamp(&event.created_at) else {
            continue;
        };
        let Some(sample) = metric.sample(event) else {
            continue;
        };
        let key = ts.timestamp().div_euclid(bucket_secs) * bucket_secs;
        buckets.entry(key).or_default().push(sample);
    }

    buckets
        .into_iter()
        .filter_map(|(key, samples)| {
            let start = DateTime::from_timestamp(key, 0)?;
            Some(TelemetryPoint {
                timestamp: start.to_rfc3339_opts(SecondsFormat::Secs, true),
                value: metric.reduce(&samples),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn event(
        created_at: &str,
        event_type: &str,
        latency_ms: Option<i64>,
        success: bool,
        metadata: Value,
    ) -> TelemetryEvent {
        let metadata: Map<String, Value> = match metadata {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        TelemetryEvent {
            id: format!("{}-{}", event_type, created_at),
            created_at: created_at.to_string(),
            scenario_id: "s".to_string(),
            run_id: None,
            agent_id: None,
            event_type: event_type.to_string(),
            latency_ms,
            success,
            metadata,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        assert_eq!(percentile(&[10], 50.0), Some(10));
        assert_eq!(percentile(&[10], 95.0), Some(10));
        assert_eq!(percentile(&[4, 1, 3, 2], 95.0), Some(4));
        assert_eq!(percentile(&[4, 1, 3, 2], 50.0), Some(3));
        assert_eq!(percentile(&[1, 2], 50.0), Some(1));
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[5, 9], 150.0), Some(9));
        assert_eq!(percentile(&[5, 9], -10.0), Some(5));
    }

    #[test]
    fn test_empty_summary() {
        let s = summarize("s", "24h", &[]);
        assert_eq!(s.total_events, 0);
        assert_eq!(s.error_rate, 0.0);
        assert_eq!(s.escalation_rate, 0.0);
        assert_eq!(s.citation_coverage, 0.0);
        assert_eq!(s.latency_p50, None);
        assert_eq!(s.latency_p95, None);
    }

    #[test]
    fn test_summary_rates() {
        let t = "2026-01-01T00:00:00.000000Z";
        let events = vec![
            event(t, "rag_run", Some(100), true, json!({"citations": 2})),
            event(t, "rag_run", Some(300), true, json!({"citations": 0})),
            event(t, "response", None, false, json!({"citations": 1, "escalated": true})),
            event(t, "escalation", Some(200), true, json!({})),
            event(t, "tool_call", None, false, json!({"citations": 5, "escalated": "yes"})),
        ];
        let s = summarize("s", "1h", &events);
        assert_eq!(s.total_events, 5);
        assert_eq!(s.error_rate, 0.4);
        assert_eq!(s.escalation_rate, 0.4);
        // tool_call is not answer-bearing, so 2 of 3 are covered
        assert!((s.citation_coverage - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.latency_p50, Some(200));
        assert_eq!(s.latency_p95, Some(300));
    }

    #[test]
    fn test_metadata_count_shapes() {
        assert_eq!(metadata_count(&json!(3)), 3);
        assert_eq!(metadata_count(&json!(2.7)), 2);
        assert_eq!(metadata_count(&json!("4")), 4);
        assert_eq!(metadata_count(&json!(["a", "b"])), 2);
        assert_eq!(metadata_count(&json!(null)), 0);
        assert_eq!(metadata_count(&json!({"n": 1})), 0);
    }

    #[test]
    fn test_metric_names_round_trip() {
        for m in Metric::ALL {
            assert_eq!(m.as_str().parse::<Metric>(), Ok(m));
        }
        assert!("throughput".parse::<Metric>().is_err());
    }

    #[test]
    fn test_timeseries_buckets_and_orders() {
        let events = vec![
            event("2026-01-01T00:01:00.000000Z", "x", Some(10), true, json!({})),
            event("2026-01-01T00:04:59.000000Z", "x", Some(30), false, json!({})),
            event("2026-01-01T00:05:00.000000Z", "x", None, true, json!({})),
            event("not-a-time", "x", Some(999), false, json!({})),
            event("2026-01-01T00:12:00.000000Z", "x", Some(50), true, json!({})),
        ];

        let latency = timeseries(Metric::Latency, &events, 300);
        assert_eq!(latency.len(), 2, "the 00:05 bucket has no latency samples");
        assert_eq!(latency[0].timestamp, "2026-01-01T00:00:00Z");
        assert_eq!(latency[0].value, 20.0);
        assert_eq!(latency[1].timestamp, "2026-01-01T00:10:00Z");
        assert_eq!(latency[1].value, 50.0);

        let errors = timeseries(Metric::ErrorRate, &events, 300);
        let values: Vec<f64> = errors.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_timeseries_percentile_per_bucket() {
        let t = "2026-01-01T00:00:00.000000Z";
        let events: Vec<TelemetryEvent> = [10, 20, 30, 40]
            .iter()
            .map(|ms| event(t, "x", Some(*ms), true, json!({})))
            .collect();
        assert_eq!(timeseries(Metric::LatencyP95, &events, 300)[0].value, 40.0);
        assert_eq!(timeseries(Metric::LatencyP50, &events, 300)[0].value, 30.0);
    }

    #[test]
    fn test_eval_pass_rate_only_from_eval_runs() {
        let t = "2026-01-01T00:00:00.000000Z";
        let events = vec![
            event(t, "eval_run", Some(1), true, json!({"passRate": 80})),
            event(t, "eval_run", Some(1), true, json!({"passRate": 90})),
            event(t, "eval_run", Some(1), true, json!({})),
            event(t, "rag_run", Some(1), true, json!({"passRate": 10})),
        ];
        let points = timeseries(Metric::EvalPassRate, &events, 1_800);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 85.0);
    }

    #[test]
    fn test_citation_coverage_series_skips_unrelated() {
        let t = "2026-01-01T00:00:00.000000Z";
        let events = vec![
            event(t, "rag_run", None, true, json!({"citations": 0})),
            event(t, "rag_run", None, true, json!({})),
            event(t, "tool_call", None, true, json!({"citations": 3})),
        ];
        let points = timeseries(Metric::CitationCoverage, &events, 300);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 0.0);
    }
}
