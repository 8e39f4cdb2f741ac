//! Release verdict referee.
//!
//! A fixed rule table over the run's accumulated state. Each unmet rule
//! contributes a reason; no reasons means `SHIP`, otherwise `BLOCK` when
//! risk or regulatory heat has reached the hard ceiling, else `REVISE`.

use serde::{Deserialize, Serialize};

use crate::models::{Effects, Meters};

pub const REQUIRED_ADVISORS: i64 = 4;
pub const MIN_EVAL_PASS_RATE: i64 = 80;
pub const MAX_RISK: i64 = 60;
pub const MAX_REG_HEAT: i64 = 60;
pub const MIN_RELIABILITY: i64 = 55;
pub const BLOCK_CEILING: i64 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Ship,
    Revise,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictRequest {
    /// Distinct advisors consulted this run.
    #[serde(alias = "talkedToCount")]
    pub consulted_count: i64,
    pub rag_passed: bool,
    pub eval_pass_rate: i64,
    pub meters: Meters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictResponse {
    pub lines: Vec<String>,
    pub reasons: Vec<String>,
    pub verdict: Verdict,
    pub effects: Effects,
}

/// Unmet release conditions, in rule order.
pub fn reasons(req: &VerdictRequest) -> Vec<String> {
    let m = &req.meters;
    let mut reasons = Vec::new();

    if req.consulted_count < REQUIRED_ADVISORS {
        reasons.push("You have not consulted all four council members.".to_string());
    }
    if !req.rag_passed {
        reasons.push("RAG Test Rig did not pass.".to_string());
    }
    if req.eval_pass_rate < MIN_EVAL_PASS_RATE {
        reasons.push(format!(
            "Eval pass rate too low ({}% < {}%).",
            req.eval_pass_rate, MIN_EVAL_PASS_RATE
        ));
    }
    if m.risk > MAX_RISK {
        reasons.push(format!("Risk too high ({} > {}).", m.risk, MAX_RISK));
    }
    if m.reg_heat > MAX_REG_HEAT {
        reasons.push(format!(
            "Regulatory heat too high ({} > {}).",
            m.reg_heat, MAX_REG_HEAT
        ));
    }
    if m.reliability < MIN_RELIABILITY {
        reasons.push(format!(
            "Reliability too low ({} < {}).",
            m.reliability, MIN_RELIABILITY
        ));
    }

    reasons
}

pub fn decide(reasons: &[String], meters: &Meters) -> Verdict {
    if reasons.is_empty() {
        Verdict::Ship
    } else if meters.risk >= BLOCK_CEILING || meters.reg_heat >= BLOCK_CEILING {
        Verdict::Block
    } else {
        Verdict::Revise
    }
}

pub fn effects_for(verdict: Verdict) -> Effects {
    match verdict {
        Verdict::Ship => Effects {
            reliability: 2,
            cost: 0,
            risk: -1,
            reg_heat: -1,
        },
        Verdict::Block => Effects {
            reliability: 0,
            cost: 0,
            risk: 1,
            reg_heat: 1,
        },
        Verdict::Revise => Effects::default(),
    }
}

fn narrate(verdict: Verdict) -> Vec<String> {
    let trailer: [&str; 2] = match verdict {
        Verdict::Ship => ["✅ SHIP approved.", "This release meets the current safety bar."],
        Verdict::Block => [
            "⛔ BLOCKED.",
            "Deployment would be unsafe under current conditions.",
        ],
        Verdict::Revise => [
            "⚠️ REVISE required.",
            "Address issues and resubmit for review.",
        ],
    };

    let mut lines = vec![
        "Whiteboard referee review complete.".to_string(),
        "Verdict is based on evidence quality, safety escalation, and operational risk."
            .to_string(),
        String::new(),
    ];
    lines.extend(trailer.iter().map(|s| s.to_string()));
    lines
}

pub fn evaluate(req: &VerdictRequest) -> VerdictResponse {
    let reasons = reasons(req);
    let verdict = decide(&reasons, &req.meters);
    VerdictResponse {
        lines: narrate(verdict),
        reasons,
        verdict,
        effects: effects_for(verdict),
    }
}
