//! Registry lifecycle: creation, finishing, purging, and the end-to-end
//! parent/child walkthrough.

use std::sync::Arc;

use correlation_core::{
    AllowAll, CorrelationEngine, CorrelationError, CorrelationState, EngineConfig, Identity,
    InMemoryStore, InstanceState, NewEntry, QueryOptions,
};
use serde_json::json;

fn engine() -> (Arc<InMemoryStore>, CorrelationEngine<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = CorrelationEngine::new(
        Arc::clone(&store),
        Arc::new(AllowAll),
        &EngineConfig::default(),
    );
    (store, engine)
}

fn alice() -> Identity {
    Identity::new("alice", "token-alice")
}

fn page() -> QueryOptions {
    QueryOptions::default()
}

#[tokio::test]
async fn created_instance_reads_back_with_supplied_fields() {
    let (_, engine) = engine();
    let created = engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();

    let read = engine
        .queries
        .get_by_process_instance_id(&alice(), "p1")
        .await
        .unwrap();
    assert_eq!(read, created);
    assert_eq!(read.correlation_id, "c1");
    assert_eq!(read.process_model_id, "m1");
    assert_eq!(read.process_model_hash, "h1");
    assert_eq!(read.parent_process_instance_id, None);
    assert_eq!(read.state, InstanceState::Running);
    assert_eq!(read.owner.subject, "alice");
    assert!(read.finished_at.is_none());
}

#[tokio::test]
async fn first_entry_creates_correlation_and_later_entries_join_it() {
    let (store, engine) = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p2", "m2", "h2"))
        .await
        .unwrap();

    assert_eq!(store.correlation_count().await, 1);
    let view = engine
        .queries
        .get_by_correlation_id(&alice(), "c1")
        .await
        .unwrap();
    assert_eq!(view.process_instances.len(), 2);
}

#[tokio::test]
async fn duplicate_instance_id_is_rejected() {
    let (store, engine) = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    let err = engine
        .registry
        .create_entry(&alice(), NewEntry::new("c2", "p1", "m1", "h1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::DuplicateKey { ref id } if id == "p1"));
    // The rejected entry must not have created c2 either.
    assert_eq!(store.correlation_count().await, 1);
}

#[tokio::test]
async fn whitespace_identifiers_are_ordinary_ids() {
    let (_, engine) = engine();
    let created = engine
        .registry
        .create_entry(&alice(), NewEntry::new(" ", "\t", "m1", "h1"))
        .await
        .unwrap();
    assert_eq!(created.correlation_id, " ");

    let view = engine
        .queries
        .get_by_correlation_id(&alice(), " ")
        .await
        .unwrap();
    assert_eq!(view.process_instances[0].process_instance_id, "\t");

    let err = engine
        .registry
        .create_entry(&alice(), NewEntry::new("", "p1", "m1", "h1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_argument");
}

#[tokio::test]
async fn unknown_parent_is_invalid_reference() {
    let (store, engine) = engine();
    let err = engine
        .registry
        .create_entry(
            &alice(),
            NewEntry::new("c1", "p1", "m1", "h1").with_parent("ghost"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::InvalidReference { ref id } if id == "ghost"));
    assert_eq!(store.process_instance_count().await, 0);
}

#[tokio::test]
async fn finished_instance_cannot_transition_again() {
    let (_, engine) = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .finish_process_instance(&alice(), "c1", "p1")
        .await
        .unwrap();

    let again = engine
        .registry
        .finish_process_instance(&alice(), "c1", "p1")
        .await
        .unwrap_err();
    assert!(matches!(
        again,
        CorrelationError::InvalidTransition {
            state: InstanceState::Finished,
            ..
        }
    ));

    let with_error = engine
        .registry
        .finish_process_instance_with_error(&alice(), "c1", "p1", json!({"code": 1}))
        .await
        .unwrap_err();
    assert_eq!(with_error.kind(), "invalid_transition");
}

#[tokio::test]
async fn error_finish_stores_payload_and_sets_error_state() {
    let (_, engine) = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    let payload = json!({"message": "boom", "details": [1, 2, 3]});
    let failed = engine
        .registry
        .finish_process_instance_with_error(&alice(), "c1", "p1", payload.clone())
        .await
        .unwrap();
    assert_eq!(failed.state, InstanceState::Error);
    assert_eq!(failed.error, Some(payload));

    let view = engine
        .queries
        .get_by_correlation_id(&alice(), "c1")
        .await
        .unwrap();
    assert_eq!(view.state, CorrelationState::Error);
}

#[tokio::test]
async fn correlation_state_follows_member_instances() {
    let (_, engine) = engine();
    for pid in ["p1", "p2"] {
        engine
            .registry
            .create_entry(&alice(), NewEntry::new("c1", pid, "m1", "h1"))
            .await
            .unwrap();
    }
    engine
        .registry
        .finish_process_instance_with_error(&alice(), "c1", "p1", json!("failed"))
        .await
        .unwrap();

    let view = engine
        .queries
        .get_by_correlation_id(&alice(), "c1")
        .await
        .unwrap();
    assert_eq!(view.state, CorrelationState::Active);

    engine
        .registry
        .finish_process_instance(&alice(), "c1", "p2")
        .await
        .unwrap();
    let view = engine
        .queries
        .get_by_correlation_id(&alice(), "c1")
        .await
        .unwrap();
    assert_eq!(view.state, CorrelationState::Error);
}

#[tokio::test]
async fn correlation_leaves_active_but_stays_in_all() {
    let (_, engine) = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    let active = engine.queries.get_active(&alice(), page()).await.unwrap();
    assert_eq!(active.len(), 1);

    engine
        .registry
        .finish_process_instance(&alice(), "c1", "p1")
        .await
        .unwrap();

    assert!(engine
        .queries
        .get_active(&alice(), page())
        .await
        .unwrap()
        .is_empty());
    let all = engine.queries.get_all(&alice(), page()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, CorrelationState::Finished);
}

#[tokio::test]
async fn parent_child_walkthrough() {
    let (_, engine) = engine();
    let me = alice();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c1", "p2", "m1", "h1").with_parent("p1"))
        .await
        .unwrap();
    engine
        .registry
        .finish_process_instance(&me, "c1", "p1")
        .await
        .unwrap();

    let view = engine.queries.get_by_correlation_id(&me, "c1").await.unwrap();
    assert_eq!(view.correlation_id, "c1");

    let active = engine.queries.get_active(&me, page()).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].correlation_id, "c1");

    let children = engine
        .queries
        .get_subprocesses_for_process_instance(&me, "p1", page())
        .await
        .unwrap();
    let ids: Vec<&str> = children
        .iter()
        .map(|p| p.process_instance_id.as_str())
        .collect();
    assert_eq!(ids, ["p2"]);

    let again = engine
        .registry
        .finish_process_instance(&me, "c1", "p1")
        .await
        .unwrap_err();
    assert_eq!(again.kind(), "invalid_transition");

    let summary = engine
        .registry
        .delete_correlation_by_process_model_id(&me, "m1")
        .await
        .unwrap();
    assert_eq!(summary.correlation_ids, ["c1"]);
    assert_eq!(summary.process_instance_ids, ["p1", "p2"]);

    assert!(engine
        .queries
        .get_by_process_model_id(&me, "m1", page())
        .await
        .unwrap()
        .is_empty());
    let gone = engine
        .queries
        .get_by_process_instance_id(&me, "p1")
        .await
        .unwrap_err();
    assert!(matches!(gone, CorrelationError::NotFound { .. }));
}

#[tokio::test]
async fn purge_spares_mixed_model_correlations() {
    let (store, engine) = engine();
    let me = alice();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c2", "p2", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c2", "p3", "m2", "h2"))
        .await
        .unwrap();

    let summary = engine
        .registry
        .delete_correlation_by_process_model_id(&me, "m1")
        .await
        .unwrap();
    assert_eq!(summary.correlation_ids, ["c1"]);
    assert_eq!(store.process_instance_count().await, 2);

    let remaining = engine
        .queries
        .get_by_process_model_id(&me, "m1", page())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].correlation_id, "c2");
}

#[tokio::test]
async fn purge_is_idempotent() {
    let (_, engine) = engine();
    let me = alice();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    let first = engine
        .registry
        .delete_correlation_by_process_model_id(&me, "m1")
        .await
        .unwrap();
    assert!(!first.is_empty());
    let second = engine
        .registry
        .delete_correlation_by_process_model_id(&me, "m1")
        .await
        .unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn subprocess_in_surviving_correlation_keeps_parent_reference() {
    let (_, engine) = engine();
    let me = alice();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .create_entry(&me, NewEntry::new("c2", "p2", "m2", "h2").with_parent("p1"))
        .await
        .unwrap();

    engine
        .registry
        .delete_correlation_by_process_model_id(&me, "m1")
        .await
        .unwrap();

    let child = engine
        .queries
        .get_by_process_instance_id(&me, "p2")
        .await
        .unwrap();
    assert_eq!(child.parent_process_instance_id.as_deref(), Some("p1"));
}
