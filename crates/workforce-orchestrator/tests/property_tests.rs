#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Property checks for graph ordering and bounded recovery.

use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;
use workforce_core::{FailureReason, Task, TaskStatus};
use workforce_orchestrator::{OrchestratorConfig, RecoveryAction, RecoverySupervisor, TaskGraph};

const MAX_TASKS: usize = 12;

/// Builds tasks where task `j` may depend only on tasks `i < j`, so the
/// result is always acyclic.
fn dag(rows: &[Vec<bool>]) -> Vec<Task> {
    let mut tasks: Vec<Task> = Vec::with_capacity(rows.len());
    for (j, row) in rows.iter().enumerate() {
        let deps: Vec<Uuid> = (0..j).filter(|&i| row[i]).map(|i| tasks[i].id).collect();
        tasks.push(Task::new(Uuid::nil(), format!("t{j}")).with_dependencies(deps));
    }
    tasks
}

/// Drives one task from assignment to completion.
fn run_to_completion(graph: &mut TaskGraph, id: Uuid, agent: Uuid) {
    graph.assign(id, agent).unwrap();
    graph.start(id).unwrap();
    graph.mark_validating(id, Uuid::new_v4()).unwrap();
    graph.complete(id, 0.9).unwrap();
}

proptest! {
    #[test]
    fn test_random_dag_drains_in_dependency_order(
        rows in prop::collection::vec(prop::collection::vec(any::<bool>(), MAX_TASKS), 1..MAX_TASKS),
    ) {
        let tasks = dag(&rows);
        let n = tasks.len();
        let mut graph = TaskGraph::new();
        graph.insert_batch(tasks).unwrap();
        prop_assert!(!graph.has_cycle());

        let agent = Uuid::new_v4();
        let mut rounds = 0;
        loop {
            let batch = graph.next_ready_batch(usize::MAX, Utc::now());
            if batch.is_empty() {
                break;
            }
            for id in batch {
                let task = graph.get(id).unwrap().clone();
                for dep in &task.dependencies {
                    prop_assert_eq!(graph.get(*dep).unwrap().status, TaskStatus::Completed);
                }
                graph.assign(id, agent).unwrap();
                // Refuses to start unless every dependency is complete.
                prop_assert!(graph.start(id).is_ok());
                graph.mark_validating(id, Uuid::new_v4()).unwrap();
                prop_assert!(graph.complete(id, 0.9).unwrap().is_some());
            }
            rounds += 1;
            prop_assert!(rounds <= n);
        }
        prop_assert!(graph.tasks().all(|t| t.status == TaskStatus::Completed));
    }

    #[test]
    fn test_failing_task_is_repaired_once_and_then_abandoned(
        max_retries in 1u32..5,
        timeouts in prop::collection::vec(any::<bool>(), 16),
    ) {
        let supervisor = RecoverySupervisor::new(&OrchestratorConfig {
            max_retries,
            ..Default::default()
        });
        let mut graph = TaskGraph::new();
        let task = Task::new(Uuid::nil(), "flaky");
        let id = task.id;
        graph.insert(task).unwrap();
        let agent = Uuid::new_v4();

        let mut failures = 0usize;
        let mut repairs = 0;
        loop {
            let reason = if timeouts[failures % timeouts.len()] {
                FailureReason::Timeout { elapsed_ms: 10 }
            } else {
                FailureReason::ExecutionFailure { message: "bad output".into() }
            };
            graph.assign(id, agent).unwrap();
            graph.start(id).unwrap();
            graph.fail(id, reason.clone()).unwrap();
            failures += 1;
            prop_assert!(failures <= 2 * max_retries as usize);

            let snapshot = graph.get(id).unwrap().clone();
            match supervisor.decide(&snapshot, &reason, Some(agent), &[]) {
                RecoveryAction::Retry { .. } => {
                    graph.requeue(id, None, None, None).unwrap();
                }
                RecoveryAction::RetryWithContext { note } => {
                    graph.requeue(id, None, Some(note), None).unwrap();
                }
                RecoveryAction::Repair => {
                    repairs += 1;
                    let prep = Task::new(Uuid::nil(), "prep");
                    let prep_id = prep.id;
                    graph.amend(id, vec![prep]).unwrap();
                    prop_assert_eq!(graph.get(id).unwrap().status, TaskStatus::Pending);
                    run_to_completion(&mut graph, prep_id, agent);
                    prop_assert_eq!(graph.get(id).unwrap().status, TaskStatus::Ready);
                }
                RecoveryAction::Abandon { summary } => {
                    prop_assert!(summary.contains("flaky"));
                    graph.mark_terminal(id).unwrap();
                    break;
                }
            }
        }
        prop_assert_eq!(repairs, 1);
        prop_assert_eq!(failures, 2 * max_retries as usize);
        prop_assert!(graph.get(id).unwrap().is_terminal_failure());
    }
}
