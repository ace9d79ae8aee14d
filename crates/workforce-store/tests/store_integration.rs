#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use uuid::Uuid;
use workforce_core::{
    Agent, Deliverable, Goal, GoalConstraints, GoalStatus, MemoryPattern, OutcomeClass, Seniority,
    Task,
};
use workforce_store::{FileStore, RecordKind, Store, StoreExt};

#[tokio::test]
async fn test_file_store_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).await.unwrap();
    let ws = Uuid::new_v4();

    let mut goal = Goal::new(ws, "Publish launch post", &GoalConstraints::default(), 0.7);
    store.save(&goal).await.unwrap();
    assert!(tmp
        .path()
        .join("goals")
        .join(format!("{}.json", goal.id))
        .exists());

    goal.transition(GoalStatus::Paused).unwrap();
    store.save(&goal).await.unwrap();

    let loaded: Goal = store.load(goal.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, GoalStatus::Paused);
    assert_eq!(loaded.workspace_id, ws);
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Uuid::new_v4();
    let agent = Agent::new(ws, "Ada", "writer", Seniority::Senior).with_capabilities(["writing"]);
    let pattern = MemoryPattern::new(
        ws,
        "abc",
        vec!["write".into(), "post".into()],
        OutcomeClass::Success,
        "went fine",
    );

    {
        let store = FileStore::new(tmp.path()).await.unwrap();
        store.save(&agent).await.unwrap();
        store.save(&pattern).await.unwrap();
    }

    let store = FileStore::new(tmp.path()).await.unwrap();
    let agents: Vec<Agent> = store.load_all(ws).await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name, "Ada");
    let patterns: Vec<MemoryPattern> = store.load_all(ws).await.unwrap();
    assert_eq!(patterns[0].narrative, "went fine");
}

#[tokio::test]
async fn test_file_store_missing_and_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).await.unwrap();
    assert!(store.load::<Task>(Uuid::new_v4()).await.unwrap().is_none());

    let task = Task::new(Uuid::new_v4(), "draft");
    store.save(&task).await.unwrap();
    store.remove::<Task>(task.id).await.unwrap();
    store.remove::<Task>(task.id).await.unwrap();
    assert!(store.load::<Task>(task.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_store_skips_corrupt_records() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).await.unwrap();
    let ws = Uuid::new_v4();
    store.save(&Task::new(ws, "ok")).await.unwrap();
    std::fs::write(
        tmp.path().join("tasks").join(format!("{}.json", Uuid::new_v4())),
        "{not json",
    )
    .unwrap();
    std::fs::write(tmp.path().join("tasks").join("README.txt"), "ignored").unwrap();

    let tasks = store.list(RecordKind::Task, Some(ws)).await.unwrap();
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn test_concurrent_writers_through_trait_object() {
    let tmp = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FileStore::new(tmp.path()).await.unwrap());
    let ws = Uuid::new_v4();
    let goal_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for version in 1..=8u32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let deliverable = Deliverable::draft(ws, goal_id, version);
            store.save(&deliverable).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let all: Vec<Deliverable> = store.load_all(ws).await.unwrap();
    assert_eq!(all.len(), 8);
}
