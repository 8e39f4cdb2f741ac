//! Evaluation simulator.
//!
//! Derives a synthetic pass rate from a retrieval outcome:
//! `base = 55 (+20 if the retrieval passed)`, then
//! `passRate = base + floor((ragScore - 55) / 2)` clamped into `[0, 100]`.
//! Anything under 80 records the single grounding failure `E-01`.

use serde::Serialize;

use crate::models::{Effects, EvalFailure};

pub const EVAL_PASS_RATE: i64 = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResult {
    pub ran: bool,
    pub pass_rate: i64,
    pub failures: Vec<EvalFailure>,
}

pub fn pass_rate(rag_score: i64, rag_passed: bool) -> i64 {
    let base: i64 = 55 + if rag_passed { 20 } else { 0 };
    let drift = rag_score.saturating_sub(55).div_euclid(2);
    base.saturating_add(drift).clamp(0, 100)
}

pub fn simulate(rag_score: i64, rag_passed: bool) -> EvalResult {
    let pass_rate = pass_rate(rag_score, rag_passed);
    let failures = if pass_rate < EVAL_PASS_RATE {
        vec![EvalFailure {
            id: "E-01".to_string(),
            reason: "Insufficient grounding".to_string(),
        }]
    } else {
        Vec::new()
    };
    EvalResult {
        ran: true,
        pass_rate,
        failures,
    }
}

pub fn effects_for(pass_rate: i64) -> Effects {
    Effects {
        reliability: if pass_rate >= EVAL_PASS_RATE { 4 } else { -2 },
        ..Effects::default()
    }
}
