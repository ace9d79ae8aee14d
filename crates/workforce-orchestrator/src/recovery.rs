use crate::config::{BackoffConfig, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use workforce_core::{FailureClass, FailureReason, OutcomeClass, Task};
use workforce_memory::PatternMatch;

/// What to do with a task whose attempt just failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Requeue unchanged, optionally skipping the failing agent once.
    Retry {
        exclude_agent: Option<Uuid>,
        delay_ms: u64,
    },
    /// Requeue with a note explaining what went wrong.
    RetryWithContext { note: String },
    /// Ask the planner for prerequisite work, then retry.
    Repair,
    /// Give up on the task.
    Abandon { summary: String },
}

impl RecoveryAction {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::Retry { .. } => "retry",
            RecoveryAction::RetryWithContext { .. } => "retry_with_context",
            RecoveryAction::Repair => "repair",
            RecoveryAction::Abandon { .. } => "abandon",
        }
    }
}

/// Decides recovery from the failure reason, the task's history, and similar
/// past failures in workspace memory.
#[derive(Debug, Clone)]
pub struct RecoverySupervisor {
    max_retries: u32,
    escalate_after: usize,
    repeat_similarity: f64,
    backoff: BackoffConfig,
}

impl RecoverySupervisor {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            escalate_after: config.memory.escalate_after_similar_failures,
            repeat_similarity: config.memory.repeat_similarity,
            backoff: config.backoff.clone(),
        }
    }

    /// `task.attempt_count` must already include the failed attempt.
    /// `similar` holds past patterns for the task's shape.
    pub fn decide(
        &self,
        task: &Task,
        reason: &FailureReason,
        failed_agent: Option<Uuid>,
        similar: &[PatternMatch],
    ) -> RecoveryAction {
        let exhausted = task.attempt_count >= self.max_retries;
        let repeated = reason.class() == FailureClass::Content
            && self.escalate_after > 0
            && similar
                .iter()
                .filter(|m| {
                    m.pattern.outcome == OutcomeClass::Failure
                        && m.similarity >= self.repeat_similarity
                })
                .count()
                >= self.escalate_after;

        if exhausted || repeated {
            if task.repaired {
                return RecoveryAction::Abandon {
                    summary: format!(
                        "Task '{}' failed after {} attempt(s) and a repair: {}",
                        task.name,
                        task.attempt_count,
                        reason.summary()
                    ),
                };
            }
            return RecoveryAction::Repair;
        }

        match reason {
            FailureReason::Timeout { .. } => RecoveryAction::Retry {
                exclude_agent: failed_agent,
                delay_ms: self.backoff.delay_ms(task.attempt_count.saturating_sub(1)),
            },
            FailureReason::AssignmentUnavailable => RecoveryAction::Retry {
                exclude_agent: None,
                delay_ms: self.backoff.delay_ms(task.attempt_count.saturating_sub(1)),
            },
            FailureReason::ExecutionFailure { .. }
            | FailureReason::QualityRejected { .. }
            | FailureReason::HumanRejected { .. } => {
                let mut note = format!(
                    "Previous attempt {}: {}",
                    task.attempt_count,
                    reason.summary()
                );
                for past in similar
                    .iter()
                    .filter(|m| m.pattern.outcome == OutcomeClass::Failure)
                    .take(2)
                {
                    note.push_str(&format!(" | Seen before: {}", past.pattern.narrative));
                }
                RecoveryAction::RetryWithContext { note }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use workforce_core::MemoryPattern;

    fn supervisor() -> RecoverySupervisor {
        RecoverySupervisor::new(&OrchestratorConfig::default())
    }

    fn task_with_attempts(n: u32) -> Task {
        let mut task = Task::new(Uuid::nil(), "draft");
        task.attempt_count = n;
        task
    }

    fn failure(similarity: f64) -> PatternMatch {
        PatternMatch {
            pattern: MemoryPattern::new(
                Uuid::nil(),
                "sig",
                vec!["@task".into()],
                OutcomeClass::Failure,
                "missing pricing table",
            ),
            similarity,
        }
    }

    fn content() -> FailureReason {
        FailureReason::ExecutionFailure {
            message: "no data".into(),
        }
    }

    #[test]
    fn test_timeout_retries_without_failing_agent() {
        let agent = Uuid::new_v4();
        let action = supervisor().decide(
            &task_with_attempts(1),
            &FailureReason::Timeout { elapsed_ms: 10 },
            Some(agent),
            &[],
        );
        assert_eq!(
            action,
            RecoveryAction::Retry {
                exclude_agent: Some(agent),
                delay_ms: 200
            }
        );
    }

    #[test]
    fn test_content_failure_adds_context() {
        let action = supervisor().decide(&task_with_attempts(1), &content(), None, &[failure(0.6)]);
        match action {
            RecoveryAction::RetryWithContext { note } => {
                assert!(note.starts_with("Previous attempt 1: execution failed: no data"));
                assert!(note.contains("missing pricing table"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_retries_repair_then_abandon() {
        let mut task = task_with_attempts(3);
        assert_eq!(
            supervisor().decide(&task, &content(), None, &[]),
            RecoveryAction::Repair
        );
        task.repaired = true;
        assert!(matches!(
            supervisor().decide(&task, &content(), None, &[]),
            RecoveryAction::Abandon { .. }
        ));
    }

    #[test]
    fn test_repeated_similar_failures_escalate_early() {
        let task = task_with_attempts(1);
        let similar = [failure(0.9), failure(0.85)];
        assert_eq!(
            supervisor().decide(&task, &content(), None, &similar),
            RecoveryAction::Repair
        );
        // Weak matches do not count as repeats.
        let weak = [failure(0.6), failure(0.6)];
        assert!(matches!(
            supervisor().decide(&task, &content(), None, &weak),
            RecoveryAction::RetryWithContext { .. }
        ));
        // Transient failures never escalate on memory alone.
        assert!(matches!(
            supervisor().decide(&task, &FailureReason::Timeout { elapsed_ms: 1 }, None, &similar),
            RecoveryAction::Retry { .. }
        ));
    }
}
