//! The four council advisors the player must consult before review.

use serde::Serialize;

use crate::models::Effects;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponse {
    pub lines: Vec<String>,
    pub effects: Effects,
}

pub struct Advisor {
    pub key: &'static str,
    pub lines: &'static [&'static str],
    pub effects: Effects,
}

pub const ADVISORS: &[Advisor] = &[
    Advisor {
        key: "mlengineer",
        lines: &[
            "ML Engineer (Model Bench)",
            "",
            "Telemetry lens:",
            "• Watch p95 latency: safety checks + tool calls can push it over budget.",
            "• Reduce error rate by adding guardrails and better input validation.",
            "• If uncertainty is high, escalate rather than guessing.",
        ],
        effects: Effects {
            reliability: 1,
            cost: 0,
            risk: -1,
            reg_heat: 0,
        },
    },
    Advisor {
        key: "aiproductengineer",
        lines: &[
            "AI Product Eng (Agent Console)",
            "",
            "Product lens:",
            "• Users care about consistent behavior more than peak scores.",
            "• Citation coverage is a trust metric — treat it like a feature.",
            "• Escalation rate should be stable and policy-driven, not random.",
        ],
        effects: Effects {
            reliability: 1,
            cost: 0,
            risk: 0,
            reg_heat: -1,
        },
    },
    Advisor {
        key: "infraengineer",
        lines: &[
            "Infra/MLOps (Deploy Terminal)",
            "",
            "Ops lens:",
            "• If p95 latency rises, check tool retries and retrieval size (topK/chunks).",
            "• Add timeouts and circuit breakers for external calls.",
            "• Track error rate and correlate with changes you make.",
        ],
        effects: Effects {
            reliability: 0,
            cost: 1,
            risk: -1,
            reg_heat: 0,
        },
    },
    Advisor {
        key: "securityadvisor",
        lines: &[
            "Security/Policy (Compliance Desk)",
            "",
            "Policy lens:",
            "• Missing citations + high confidence is a compliance hazard.",
            "• Escalate on missing context (location, circuit id, operator authorization).",
            "• Treat prompt injection as an incident class (coming in v1.4).",
        ],
        effects: Effects {
            reliability: 0,
            cost: 0,
            risk: -1,
            reg_heat: -2,
        },
    },
];

pub fn find(key: &str) -> Option<&'static Advisor> {
    ADVISORS.iter().find(|a| a.key == key)
}

impl Advisor {
    pub fn interaction(&self) -> InteractionResponse {
        InteractionResponse {
            lines: self.lines.iter().map(|l| l.to_string()).collect(),
            effects: self.effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_distinct_advisors() {
        assert_eq!(ADVISORS.len(), 4);
        for a in ADVISORS {
            assert_eq!(find(a.key).map(|f| f.key), Some(a.key));
        }
    }

    #[test]
    fn test_unknown_key() {
        assert!(find("janitor").is_none());
    }

    #[test]
    fn test_security_advisor_cools_regulators() {
        let resp = find("securityadvisor").unwrap().interaction();
        assert_eq!(resp.effects.reg_heat, -2);
        assert_eq!(resp.lines[0], "Security/Policy (Compliance Desk)");
    }

    #[test]
    fn test_lines_are_shown_verbatim() {
        let product = find("aiproductengineer").unwrap().interaction();
        assert_eq!(
            product.lines[4],
            "• Citation coverage is a trust metric — treat it like a feature."
        );
        let security = find("securityadvisor").unwrap().interaction();
        assert_eq!(
            security.lines[5],
            "• Treat prompt injection as an incident class (coming in v1.4)."
        );
    }
}
