use crate::capability::{AgentIdentity, ExecutionCapability, ExecutionOutcome, TaskSpec};
use crate::events::EventFeed;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};
use workforce_core::{
    ArtifactDraft, EventKind, ExecutionTrace, FailureReason, TraceStepKind,
};

/// Append-only recorder handed to an execution capability for one attempt.
///
/// Every step is also published on the workspace event feed. Steps pushed
/// after the attempt ended are dropped.
pub struct TraceRecorder {
    trace: Mutex<ExecutionTrace>,
    events: Option<Arc<EventFeed>>,
}

impl TraceRecorder {
    pub fn new(trace: ExecutionTrace, events: Option<Arc<EventFeed>>) -> Self {
        Self {
            trace: Mutex::new(trace),
            events,
        }
    }

    /// A recorder that publishes nothing; for driving capabilities directly.
    pub fn detached(trace: ExecutionTrace) -> Self {
        Self::new(trace, None)
    }

    fn push(&self, kind: TraceStepKind, content: impl Into<String>) {
        let (task_id, attempt_id, step) = {
            let mut trace = self.trace.lock();
            let Some(step) = trace.push(kind, content) else {
                return;
            };
            (trace.task_id, trace.attempt_id, step)
        };
        if let Some(events) = &self.events {
            events.publish(EventKind::TraceStep {
                task_id,
                attempt_id,
                step,
            });
        }
    }

    pub fn thinking(&self, content: impl Into<String>) {
        self.push(TraceStepKind::Thinking, content);
    }

    pub fn action(&self, content: impl Into<String>) {
        self.push(TraceStepKind::Action, content);
    }

    pub fn observation(&self, content: impl Into<String>) {
        self.push(TraceStepKind::Observation, content);
    }

    pub fn snapshot(&self) -> ExecutionTrace {
        self.trace.lock().clone()
    }

    /// Seals the trace and returns it.
    pub fn finish(&self, outcome: &str) -> ExecutionTrace {
        let mut trace = self.trace.lock();
        trace.finish(outcome);
        trace.clone()
    }
}

/// How an attempt ended, as seen by the orchestrator.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Succeeded(ArtifactDraft),
    Failed(FailureReason),
    /// The owning goal was canceled while the attempt ran.
    Canceled,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Succeeded(_) => "succeeded",
            AttemptOutcome::Failed(FailureReason::Timeout { .. }) => "timed_out",
            AttemptOutcome::Failed(_) => "failed",
            AttemptOutcome::Canceled => "canceled",
        }
    }
}

#[derive(Debug)]
pub struct AttemptReport {
    pub trace: ExecutionTrace,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

/// Runs single attempts against the execution capability under a wall-clock
/// limit and a cooperative cancel signal.
pub struct ExecutionCoordinator {
    capability: Arc<dyn ExecutionCapability>,
    events: Arc<EventFeed>,
    default_timeout_ms: u64,
}

impl ExecutionCoordinator {
    pub fn new(
        capability: Arc<dyn ExecutionCapability>,
        events: Arc<EventFeed>,
        default_timeout_ms: u64,
    ) -> Self {
        Self {
            capability,
            events,
            default_timeout_ms,
        }
    }

    /// Executes one attempt.
    ///
    /// `timeout_ms` overrides the default limit. The attempt is abandoned as
    /// soon as `cancel` flips to `true`; a dropped sender never cancels.
    /// A panicking capability counts as an execution failure.
    pub async fn run(
        &self,
        spec: &TaskSpec,
        agent: &AgentIdentity,
        timeout_ms: Option<u64>,
        mut cancel: watch::Receiver<bool>,
    ) -> AttemptReport {
        let mut trace = ExecutionTrace::begin(
            self.events.workspace_id(),
            spec.task_id,
            spec.attempt_number,
            agent.id,
        );
        trace.attempt_id = spec.attempt_id;
        let recorder = TraceRecorder::new(trace, Some(self.events.clone()));
        let limit_ms = timeout_ms.unwrap_or(self.default_timeout_ms);
        let started = Instant::now();

        debug!(
            task_id = %spec.task_id,
            attempt = spec.attempt_number,
            agent = %agent.name,
            limit_ms,
            "Attempt started"
        );

        let execution = AssertUnwindSafe(self.capability.execute(spec, agent, &recorder))
            .catch_unwind();
        let canceled = async {
            loop {
                if *cancel.borrow_and_update() {
                    return;
                }
                if cancel.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        let outcome = tokio::select! {
            result = tokio::time::timeout(Duration::from_millis(limit_ms), execution) => {
                match result {
                    Ok(Ok(ExecutionOutcome::Success(draft))) => AttemptOutcome::Succeeded(draft),
                    Ok(Ok(ExecutionOutcome::Failure { reason })) => {
                        AttemptOutcome::Failed(FailureReason::ExecutionFailure { message: reason })
                    }
                    Ok(Ok(ExecutionOutcome::Timeout)) | Err(_) => {
                        AttemptOutcome::Failed(FailureReason::Timeout {
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        })
                    }
                    Ok(Err(_)) => {
                        warn!(task_id = %spec.task_id, "Execution capability panicked");
                        AttemptOutcome::Failed(FailureReason::ExecutionFailure {
                            message: "execution capability panicked".into(),
                        })
                    }
                }
            }
            _ = canceled => AttemptOutcome::Canceled,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            AttemptOutcome::Succeeded(_) => {
                recorder.observation("Attempt produced an artifact");
            }
            AttemptOutcome::Failed(reason) => {
                recorder.observation(reason.summary());
            }
            AttemptOutcome::Canceled => {
                recorder.observation("Attempt canceled with its goal");
            }
        }
        let trace = recorder.finish(outcome.label());
        debug!(
            task_id = %spec.task_id,
            attempt = spec.attempt_number,
            outcome = outcome.label(),
            elapsed_ms,
            "Attempt finished"
        );
        AttemptReport {
            trace,
            outcome,
            elapsed_ms,
        }
    }
}
