//! Racing writers against a shared engine.

use std::sync::Arc;

use correlation_core::{
    AllowAll, CorrelationEngine, CorrelationError, EngineConfig, Identity, InMemoryStore,
    InstanceState, NewEntry,
};
use serde_json::json;

const RACERS: usize = 16;

fn engine() -> (Arc<InMemoryStore>, CorrelationEngine<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = CorrelationEngine::new(
        Arc::clone(&store),
        Arc::new(AllowAll),
        &EngineConfig::default(),
    );
    (store, engine)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_creates_yield_one_winner() {
    let (store, engine) = engine();
    let mut handles = Vec::new();
    for i in 0..RACERS {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .registry
                .create_entry(
                    &Identity::new("alice", "t"),
                    NewEntry::new(format!("c{i}"), "p-shared", "m1", "h1"),
                )
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CorrelationError::DuplicateKey { id }) => assert_eq!(id, "p-shared"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(store.process_instance_count().await, 1);
    assert_eq!(store.correlation_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_finishes_yield_one_winner() {
    let (_, engine) = engine();
    let me = Identity::new("alice", "t");
    engine
        .registry
        .create_entry(&me, NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let engine = engine.clone();
        let me = me.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine
                    .registry
                    .finish_process_instance(&me, "c1", "p1")
                    .await
            } else {
                engine
                    .registry
                    .finish_process_instance_with_error(&me, "c1", "p1", json!({ "racer": i }))
                    .await
            }
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(record) => winners.push(record),
            Err(CorrelationError::InvalidTransition { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = engine
        .queries
        .get_by_process_instance_id(&me, "p1")
        .await
        .unwrap();
    assert_eq!(stored, winners[0]);
    assert_ne!(stored.state, InstanceState::Running);
    assert_eq!(stored.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_share_one_correlation() {
    let (store, engine) = engine();
    let mut handles = Vec::new();
    for i in 0..RACERS {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .registry
                .create_entry(
                    &Identity::new("alice", "t"),
                    NewEntry::new("c-shared", format!("p{i}"), "m1", "h1"),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.correlation_count().await, 1);
    assert_eq!(store.process_instance_count().await, RACERS);
}
