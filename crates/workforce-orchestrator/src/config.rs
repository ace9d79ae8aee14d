use regex::Regex;
use serde::{Deserialize, Serialize};
use workforce_core::{RiskLevel, WorkforceError, WorkforceResult};

/// Tunables for one workspace's orchestrator.
///
/// Every field has a default so a partial `[orchestrator]` table in
/// `workforce.toml` is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Failed attempts allowed before structural repair or terminal failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Concurrency ceiling: assigned plus in-progress tasks across the workspace.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Wall-clock limit for a single attempt unless the task overrides it.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// How long a ready task may go without a capable agent before escalation.
    #[serde(default = "default_starvation_timeout_ms")]
    pub starvation_timeout_ms: u64,
    /// Scheduler tick when nothing wakes it earlier.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Total attempts the workspace may dispatch. Unlimited when absent.
    #[serde(default)]
    pub attempt_budget: Option<u32>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_max_in_flight() -> usize {
    4
}
fn default_task_timeout_ms() -> u64 {
    60_000
}
fn default_starvation_timeout_ms() -> u64 {
    30_000
}
fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_in_flight: default_max_in_flight(),
            task_timeout_ms: default_task_timeout_ms(),
            starvation_timeout_ms: default_starvation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff: BackoffConfig::default(),
            quality: QualityConfig::default(),
            memory: MemoryConfig::default(),
            attempt_budget: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> WorkforceResult<()> {
        if self.max_in_flight == 0 {
            return Err(WorkforceError::Config(
                "max_in_flight must be at least 1".into(),
            ));
        }
        if self.task_timeout_ms == 0 || self.poll_interval_ms == 0 {
            return Err(WorkforceError::Config(
                "task_timeout_ms and poll_interval_ms must be positive".into(),
            ));
        }
        if self.backoff.base_ms > self.backoff.max_ms {
            return Err(WorkforceError::Config(format!(
                "backoff.base_ms ({}) exceeds backoff.max_ms ({})",
                self.backoff.base_ms, self.backoff.max_ms
            )));
        }
        for (name, value) in [
            ("quality.min_score", self.quality.min_score),
            ("quality.deliverable_threshold", self.quality.deliverable_threshold),
            ("memory.min_similarity", self.memory.min_similarity),
            ("memory.repeat_similarity", self.memory.repeat_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WorkforceError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        self.quality.compile_placeholders()?;
        self.quality.compile_risk_patterns()?;
        Ok(())
    }
}

/// Exponential backoff between retries and assignment attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    200
}
fn default_backoff_max_ms() -> u64 {
    5_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

impl BackoffConfig {
    /// `base * 2^attempt`, capped at `max_ms`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let delay = self.base_ms.saturating_mul(2u64.saturating_pow(attempt));
        delay.min(self.max_ms)
    }
}

/// A regex that raises an artifact's detected risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPattern {
    pub pattern: String,
    pub level: RiskLevel,
}

/// Quality gate and deliverable thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Artifacts scoring below this are rejected.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Deliverables scoring at or above this complete their goal.
    #[serde(default = "default_deliverable_threshold")]
    pub deliverable_threshold: f64,
    /// Artifacts at or above this risk are held for a human.
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: RiskLevel,
    /// Minimum trimmed content length in characters.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_placeholder_patterns")]
    pub placeholder_patterns: Vec<String>,
    #[serde(default = "default_risk_patterns")]
    pub risk_patterns: Vec<RiskPattern>,
}

fn default_min_score() -> f64 {
    0.6
}
fn default_deliverable_threshold() -> f64 {
    0.7
}
fn default_risk_threshold() -> RiskLevel {
    RiskLevel::High
}
fn default_min_length() -> usize {
    1
}
fn default_placeholder_patterns() -> Vec<String> {
    vec![
        r"(?i)lorem ipsum".into(),
        r"\bTODO\b".into(),
        r"\bTBD\b".into(),
        r"(?i)\[(insert|placeholder)[^\]]*\]".into(),
    ]
}
fn default_risk_patterns() -> Vec<RiskPattern> {
    vec![
        RiskPattern {
            pattern: r"(?i)\b(password|api[_ -]?key|secret[_ -]?key|ssn)\b".into(),
            level: RiskLevel::Critical,
        },
        RiskPattern {
            pattern: r"(?i)\b(guaranteed returns|legal advice|medical advice)\b".into(),
            level: RiskLevel::High,
        },
    ]
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            deliverable_threshold: default_deliverable_threshold(),
            risk_threshold: default_risk_threshold(),
            min_length: default_min_length(),
            placeholder_patterns: default_placeholder_patterns(),
            risk_patterns: default_risk_patterns(),
        }
    }
}

impl QualityConfig {
    pub fn compile_placeholders(&self) -> WorkforceResult<Vec<Regex>> {
        self.placeholder_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    WorkforceError::Config(format!("Invalid placeholder pattern '{p}': {e}"))
                })
            })
            .collect()
    }

    pub fn compile_risk_patterns(&self) -> WorkforceResult<Vec<(Regex, RiskLevel)>> {
        self.risk_patterns
            .iter()
            .map(|rp| {
                Regex::new(&rp.pattern)
                    .map(|re| (re, rp.level))
                    .map_err(|e| {
                        WorkforceError::Config(format!(
                            "Invalid risk pattern '{}': {e}",
                            rp.pattern
                        ))
                    })
            })
            .collect()
    }
}

/// How workspace memory is consulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Patterns fetched per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Patterns below this similarity are ignored.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    /// Similarity at which a past failure counts as "the same" failure.
    #[serde(default = "default_repeat_similarity")]
    pub repeat_similarity: f64,
    /// Similar past failures that trigger repair for a content failure.
    #[serde(default = "default_escalate_after")]
    pub escalate_after_similar_failures: usize,
}

fn default_top_k() -> usize {
    3
}
fn default_min_similarity() -> f64 {
    0.5
}
fn default_repeat_similarity() -> f64 {
    0.8
}
fn default_escalate_after() -> usize {
    2
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            repeat_similarity: default_repeat_similarity(),
            escalate_after_similar_failures: default_escalate_after(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        OrchestratorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: OrchestratorConfig =
            serde_json::from_str(r#"{"max_retries": 5, "quality": {"min_score": 0.8}}"#).unwrap();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.max_in_flight, 4);
        assert!((cfg.quality.min_score - 0.8).abs() < f64::EPSILON);
        assert!((cfg.quality.deliverable_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.quality.risk_threshold, RiskLevel::High);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = OrchestratorConfig {
            max_in_flight: 0,
            ..OrchestratorConfig::default()
        };
        assert!(cfg.validate().is_err());

        cfg.max_in_flight = 2;
        cfg.quality.deliverable_threshold = 1.5;
        assert!(cfg.validate().is_err());

        cfg.quality.deliverable_threshold = 0.7;
        cfg.quality.placeholder_patterns = vec!["(unclosed".into()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid placeholder pattern"));
    }

    #[test]
    fn test_backoff_computation() {
        let backoff = BackoffConfig {
            base_ms: 500,
            max_ms: 30_000,
        };
        assert_eq!(backoff.delay_ms(0), 500);
        assert_eq!(backoff.delay_ms(1), 1_000);
        assert_eq!(backoff.delay_ms(5), 16_000);
        assert_eq!(backoff.delay_ms(6), 30_000);
        assert_eq!(backoff.delay_ms(40), 30_000);
    }
}
