use crate::config::QualityConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use workforce_core::{Artifact, ExpectedOutput, OutputFormat, RiskLevel, WorkforceResult};

/// Scores an artifact in `[0, 1]`.
pub trait Scorer: Send + Sync {
    fn score(&self, artifact: &Artifact, expected: &ExpectedOutput) -> f64;
}

impl<F> Scorer for F
where
    F: Fn(&Artifact, &ExpectedOutput) -> f64 + Send + Sync,
{
    fn score(&self, artifact: &Artifact, expected: &ExpectedOutput) -> f64 {
        self(artifact, expected)
    }
}

/// Model-free scorer: rewards length, visible structure, and declared
/// business value.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer;

impl Scorer for HeuristicScorer {
    fn score(&self, artifact: &Artifact, expected: &ExpectedOutput) -> f64 {
        let content = artifact.content.trim();
        let length = (content.chars().count() as f64 / 200.0).min(1.0);
        let structure = match expected.format {
            OutputFormat::Json => {
                if serde_json::from_str::<serde_json::Value>(content)
                    .is_ok_and(|v| v.is_object())
                {
                    1.0
                } else {
                    0.5
                }
            }
            OutputFormat::Markdown => {
                let structured = content.lines().any(|l| {
                    let l = l.trim_start();
                    l.starts_with('#') || l.starts_with("- ") || l.starts_with("* ")
                });
                if structured || content.split_whitespace().count() >= 3 {
                    1.0
                } else {
                    0.5
                }
            }
            OutputFormat::Text => {
                if content.split_whitespace().count() >= 3 {
                    1.0
                } else {
                    0.5
                }
            }
        };
        (0.55 + 0.2 * length + 0.15 * structure + 0.1 * artifact.business_value).clamp(0.0, 1.0)
    }
}

/// Result of running the quality gate on one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved {
        score: f64,
    },
    /// Risky output parked for a human decision.
    Held {
        score: f64,
        risk: RiskLevel,
        reasons: Vec<String>,
    },
    Rejected {
        score: f64,
        reasons: Vec<String>,
    },
}

impl Verdict {
    pub fn score(&self) -> f64 {
        match self {
            Verdict::Approved { score }
            | Verdict::Held { score, .. }
            | Verdict::Rejected { score, .. } => *score,
        }
    }
}

/// Deterministic rules, risk screening, then one scored check.
pub struct QualityGate {
    min_score: f64,
    min_length: usize,
    risk_threshold: RiskLevel,
    placeholders: Vec<Regex>,
    risk_patterns: Vec<(Regex, RiskLevel)>,
    scorer: Arc<dyn Scorer>,
}

impl QualityGate {
    pub fn new(config: &QualityConfig, scorer: Arc<dyn Scorer>) -> WorkforceResult<Self> {
        Ok(Self {
            min_score: config.min_score,
            min_length: config.min_length,
            risk_threshold: config.risk_threshold,
            placeholders: config.compile_placeholders()?,
            risk_patterns: config.compile_risk_patterns()?,
            scorer,
        })
    }

    pub fn evaluate(&self, artifact: &Artifact, expected: &ExpectedOutput) -> Verdict {
        let reasons = self.rule_violations(&artifact.content, expected);
        if !reasons.is_empty() {
            return Verdict::Rejected {
                score: 0.0,
                reasons,
            };
        }

        let raw = self.scorer.score(artifact, expected);
        let score = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let (detected, matched) = self.detect_risk(&artifact.content);
        let risk = artifact.risk.max(detected);
        if risk >= self.risk_threshold {
            let mut reasons = vec![format!(
                "risk level {risk} meets the review threshold {}",
                self.risk_threshold
            )];
            reasons.extend(matched);
            return Verdict::Held {
                score,
                risk,
                reasons,
            };
        }

        if score < self.min_score {
            return Verdict::Rejected {
                score,
                reasons: vec![format!(
                    "score {score:.2} is below the minimum {:.2}",
                    self.min_score
                )],
            };
        }
        Verdict::Approved { score }
    }

    fn rule_violations(&self, content: &str, expected: &ExpectedOutput) -> Vec<String> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return vec!["output is empty".into()];
        }
        let mut reasons = Vec::new();
        if trimmed.chars().count() < self.min_length {
            reasons.push(format!(
                "output is shorter than {} characters",
                self.min_length
            ));
        }
        for re in &self.placeholders {
            if re.is_match(trimmed) {
                reasons.push(format!("output contains placeholder text ({})", re.as_str()));
            }
        }
        reasons.extend(schema_violations(trimmed, expected));
        reasons
    }

    fn detect_risk(&self, content: &str) -> (RiskLevel, Vec<String>) {
        let mut level = RiskLevel::Low;
        let mut matched = Vec::new();
        for (re, pattern_level) in &self.risk_patterns {
            if let Some(m) = re.find(content) {
                level = level.max(*pattern_level);
                matched.push(format!("mentions '{}' ({pattern_level})", m.as_str()));
            }
        }
        (level, matched)
    }
}

fn schema_violations(content: &str, expected: &ExpectedOutput) -> Vec<String> {
    match expected.format {
        OutputFormat::Json => {
            let value: serde_json::Value = match serde_json::from_str(content) {
                Ok(v) => v,
                Err(e) => return vec![format!("output is not valid JSON: {e}")],
            };
            if expected.required_fields.is_empty() {
                return Vec::new();
            }
            let Some(object) = value.as_object() else {
                return vec!["output must be a JSON object".into()];
            };
            expected
                .required_fields
                .iter()
                .filter(|f| !object.contains_key(f.as_str()))
                .map(|f| format!("missing JSON field '{f}'"))
                .collect()
        }
        OutputFormat::Markdown => {
            let headings: Vec<String> = content
                .lines()
                .map(str::trim_start)
                .filter(|l| l.starts_with('#'))
                .map(|l| l.trim_start_matches('#').trim().to_lowercase())
                .collect();
            expected
                .required_fields
                .iter()
                .filter(|f| {
                    let wanted = f.to_lowercase();
                    !headings.iter().any(|h| h.contains(&wanted))
                })
                .map(|f| format!("missing heading '{f}'"))
                .collect()
        }
        OutputFormat::Text => {
            let lower = content.to_lowercase();
            expected
                .required_fields
                .iter()
                .filter(|f| !lower.contains(&f.to_lowercase()))
                .map(|f| format!("missing '{f}'"))
                .collect()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use workforce_core::{ArtifactDraft, Task};

    fn artifact(draft: ArtifactDraft) -> Artifact {
        let task = Task::new(Uuid::nil(), "t");
        Artifact::from_draft(draft, &task, Uuid::nil(), Uuid::nil(), None)
    }

    fn gate_with(score: f64) -> QualityGate {
        QualityGate::new(
            &QualityConfig::default(),
            Arc::new(move |_: &Artifact, _: &ExpectedOutput| score),
        )
        .unwrap()
    }

    #[test]
    fn test_approves_clean_output() {
        let gate = QualityGate::new(&QualityConfig::default(), Arc::new(HeuristicScorer)).unwrap();
        let verdict = gate.evaluate(
            &artifact(ArtifactDraft::text("The launch is scheduled for March with three tiers.")),
            &ExpectedOutput::text(),
        );
        assert!(matches!(verdict, Verdict::Approved { score } if score >= 0.7));
    }

    #[test]
    fn test_rules_reject_before_scoring() {
        let gate = gate_with(1.0);
        let empty = gate.evaluate(&artifact(ArtifactDraft::text("   ")), &ExpectedOutput::text());
        assert_eq!(
            empty,
            Verdict::Rejected {
                score: 0.0,
                reasons: vec!["output is empty".into()]
            }
        );

        let placeholder = gate.evaluate(
            &artifact(ArtifactDraft::text("Pricing: TBD")),
            &ExpectedOutput::text(),
        );
        match placeholder {
            Verdict::Rejected { reasons, .. } => assert!(reasons[0].contains("placeholder")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_json_schema_conformance() {
        let gate = gate_with(1.0);
        let expected = ExpectedOutput::json(["headline", "body"]);
        let ok = gate.evaluate(
            &artifact(ArtifactDraft::json(&serde_json::json!({"headline": "h", "body": "b"}))),
            &expected,
        );
        assert!(matches!(ok, Verdict::Approved { .. }));

        let missing = gate.evaluate(
            &artifact(ArtifactDraft::json(&serde_json::json!({"headline": "h"}))),
            &expected,
        );
        match missing {
            Verdict::Rejected { reasons, .. } => {
                assert_eq!(reasons, vec!["missing JSON field 'body'".to_string()])
            }
            other => panic!("unexpected {other:?}"),
        }

        let invalid = gate.evaluate(&artifact(ArtifactDraft::text("not json")), &expected);
        assert!(matches!(invalid, Verdict::Rejected { .. }));
    }

    #[test]
    fn test_markdown_headings_required() {
        let gate = gate_with(1.0);
        let expected = ExpectedOutput {
            required_fields: vec!["Summary".into()],
            ..ExpectedOutput::markdown()
        };
        let ok = gate.evaluate(
            &artifact(ArtifactDraft::markdown("# Launch\n\n## Summary\n\nShipped.")),
            &expected,
        );
        assert!(matches!(ok, Verdict::Approved { .. }));
        let missing = gate.evaluate(&artifact(ArtifactDraft::markdown("# Launch\n\nShipped.")), &expected);
        assert!(matches!(missing, Verdict::Rejected { .. }));
    }

    #[test]
    fn test_declared_or_detected_risk_holds() {
        let gate = gate_with(0.9);
        let declared = gate.evaluate(
            &artifact(ArtifactDraft::text("Contract terms attached.").with_risk(RiskLevel::High)),
            &ExpectedOutput::text(),
        );
        assert!(matches!(declared, Verdict::Held { risk: RiskLevel::High, .. }));

        let detected = gate.evaluate(
            &artifact(ArtifactDraft::text("The admin password is hunter2.")),
            &ExpectedOutput::text(),
        );
        match detected {
            Verdict::Held { risk, reasons, .. } => {
                assert_eq!(risk, RiskLevel::Critical);
                assert!(reasons.iter().any(|r| r.contains("password")));
            }
            other => panic!("unexpected {other:?}"),
        }

        let medium = gate.evaluate(
            &artifact(ArtifactDraft::text("Routine update.").with_risk(RiskLevel::Medium)),
            &ExpectedOutput::text(),
        );
        assert!(matches!(medium, Verdict::Approved { .. }));
    }

    #[test]
    fn test_low_score_rejected() {
        let gate = gate_with(0.3);
        let verdict = gate.evaluate(
            &artifact(ArtifactDraft::text("A complete answer.")),
            &ExpectedOutput::text(),
        );
        assert!(matches!(verdict, Verdict::Rejected { score, .. } if (score - 0.3).abs() < 1e-9));
        assert!((verdict.score() - 0.3).abs() < 1e-9);
    }
}
