//! Approval types for human-in-the-loop (HITL) review.
//!
//! Artifacts whose risk reaches the configured threshold are held instead of
//! being approved automatically. A [`HoldTicket`] describes what is waiting,
//! and a [`HumanDecision`] is the signal that releases it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Risk level attached to an artifact. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Routine output.
    #[default]
    Low,
    /// Worth a second look.
    Medium,
    /// Needs review before it is relied upon.
    High,
    /// Must never be released without a reviewer.
    Critical,
}

impl RiskLevel {
    /// Parses a level name, defaulting to [`RiskLevel::Medium`] for unknown input.
    pub fn parse_level(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            "critical" => RiskLevel::Critical,
            _ => RiskLevel::Medium,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Outcome chosen by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Release the artifact as if the gate had approved it.
    Approve,
    /// Treat the artifact as a content failure.
    Reject,
}

/// The decision made by a human reviewer about one held artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanDecision {
    pub artifact_id: Uuid,
    pub decision: Decision,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default = "default_reviewer")]
    pub reviewer: String,
}

fn default_reviewer() -> String {
    "anonymous".to_string()
}

impl HumanDecision {
    /// An approval with no rationale.
    pub fn approve(artifact_id: Uuid, reviewer: impl Into<String>) -> Self {
        Self {
            artifact_id,
            decision: Decision::Approve,
            rationale: None,
            reviewer: reviewer.into(),
        }
    }

    /// A rejection carrying the reviewer's rationale.
    pub fn reject(
        artifact_id: Uuid,
        reviewer: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id,
            decision: Decision::Reject,
            rationale: Some(rationale.into()),
            reviewer: reviewer.into(),
        }
    }
}

/// An artifact parked by the quality gate until a reviewer decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldTicket {
    pub artifact_id: Uuid,
    pub task_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub score: f64,
    pub risk: RiskLevel,
    /// Why the gate refused to release the artifact on its own.
    pub reasons: Vec<String>,
    pub held_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(RiskLevel::parse_level("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::parse_level("low"), RiskLevel::Low);
        assert_eq!(RiskLevel::parse_level("whatever"), RiskLevel::Medium);
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert!(RiskLevel::Critical >= RiskLevel::High);
    }

    #[test]
    fn test_decision_deserialize_defaults() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"artifact_id":"{id}","decision":"reject"}}"#);
        let decision: HumanDecision = serde_json::from_str(&raw).unwrap();
        assert_eq!(decision.decision, Decision::Reject);
        assert_eq!(decision.reviewer, "anonymous");
        assert!(decision.rationale.is_none());
    }
}
