//! Validation of inbound telemetry payloads.
//!
//! A payload is either one event object or a non-empty array of them.
//! The whole payload is validated before anything touches the store; one
//! bad event rejects the batch.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{LabError, LabResult};
use crate::models::NewTelemetryEvent;

/// Wire shape of one inbound event. Accepts camelCase and snake_case keys.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryEventIn {
    #[serde(default, alias = "scenario_id")]
    scenario_id: Option<String>,
    #[serde(default, alias = "run_id")]
    run_id: Option<String>,
    #[serde(default, alias = "agent_id")]
    agent_id: Option<String>,
    #[serde(default, alias = "event_type")]
    event_type: Option<String>,
    #[serde(default, alias = "latency_ms")]
    latency_ms: Option<i64>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

fn invalid(index: Option<usize>, msg: impl std::fmt::Display) -> LabError {
    match index {
        Some(i) => LabError::validation(format!("event {}: {}", i, msg)),
        None => LabError::validation(msg.to_string()),
    }
}

fn parse_one(
    value: Value,
    index: Option<usize>,
    default_scenario: &str,
) -> LabResult<NewTelemetryEvent> {
    if !value.is_object() {
        return Err(invalid(index, "expected a JSON object"));
    }
    let raw: TelemetryEventIn = serde_json::from_value(value).map_err(|e| invalid(index, e))?;

    // stored exactly as sent; blank counts as missing
    let event_type = raw
        .event_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| invalid(index, "eventType is required"))?;

    if let Some(ms) = raw.latency_ms {
        if ms < 0 {
            return Err(invalid(index, format!("latencyMs must be >= 0, got {}", ms)));
        }
    }

    let scenario_id = raw
        .scenario_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default_scenario.to_string());

    Ok(NewTelemetryEvent {
        scenario_id,
        run_id: raw.run_id,
        agent_id: raw.agent_id,
        event_type,
        latency_ms: raw.latency_ms,
        success: raw.success.unwrap_or(true),
        metadata: raw.metadata.unwrap_or_default(),
    })
}

/// Validate a payload into events ready for the store, in input order.
pub fn parse_batch(payload: Value, default_scenario: &str) -> LabResult<Vec<NewTelemetryEvent>> {
    match payload {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(LabError::validation("telemetry batch is empty"));
            }
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| parse_one(item, Some(i), default_scenario))
                .collect()
        }
        other => Ok(vec![parse_one(other, None, default_scenario)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCENARIO: &str = "dayzero-utility-outage";

    #[test]
    fn test_single_object_gets_defaults() {
        let events = parse_batch(json!({"eventType": "tool_call"}), SCENARIO).unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.scenario_id, SCENARIO);
        assert_eq!(e.event_type, "tool_call");
        assert!(e.success);
        assert!(e.metadata.is_empty());
        assert_eq!(e.latency_ms, None);
    }

    #[test]
    fn test_event_type_is_stored_verbatim() {
        let events = parse_batch(json!({"eventType": " escalation "}), SCENARIO).unwrap();
        assert_eq!(events[0].event_type, " escalation ");

        let err = parse_batch(json!({"eventType": "   "}), SCENARIO).unwrap_err();
        assert!(err.to_string().contains("eventType is required"), "{}", err);
    }

    #[test]
    fn test_batch_preserves_order_and_casings() {
        let events = parse_batch(
            json!([
                {"eventType": "a", "scenarioId": "s1", "latencyMs": 5},
                {"event_type": "b", "scenario_id": "s2", "latency_ms": 7, "success": false},
                {"eventType": "c", "metadata": {"citations": 2}, "runId": "r", "agentId": "rag"},
            ]),
            SCENARIO,
        )
        .unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["a", "b", "c"]);
        assert_eq!(events[1].scenario_id, "s2");
        assert_eq!(events[1].latency_ms, Some(7));
        assert!(!events[1].success);
        assert_eq!(events[2].metadata["citations"], 2);
        assert_eq!(events[2].run_id.as_deref(), Some("r"));
    }

    #[test]
    fn test_one_bad_event_rejects_batch() {
        let err = parse_batch(
            json!([{"eventType": "a"}, {"latencyMs": 3}, {"eventType": "c"}]),
            SCENARIO,
        )
        .unwrap_err();
        assert!(matches!(err, LabError::Validation(_)));
        assert!(err.to_string().contains("event 1"), "{}", err);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            json!([]),
            json!({"eventType": "   "}),
            json!({"eventType": "x", "latencyMs": -1}),
            json!({"eventType": "x", "metadata": [1, 2]}),
            json!({"eventType": "x", "success": "yes"}),
            json!("tool_call"),
            json!([{"eventType": "x"}, 42]),
        ];
        for payload in cases {
            let result = parse_batch(payload.clone(), SCENARIO);
            assert!(
                matches!(result, Err(LabError::Validation(_))),
                "payload {} should be rejected",
                payload
            );
        }
    }

    #[test]
    fn test_null_metadata_and_blank_scenario_default() {
        let events = parse_batch(
            json!({"eventType": "x", "metadata": null, "scenarioId": ""}),
            SCENARIO,
        )
        .unwrap();
        assert!(events[0].metadata.is_empty());
        assert_eq!(events[0].scenario_id, SCENARIO);
    }
}
