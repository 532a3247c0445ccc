//! Visibility and permission rules under the claims-based filter.

use std::sync::Arc;

use correlation_core::{
    ClaimsAuthorizer, CorrelationEngine, CorrelationError, EngineConfig, Identity, InMemoryStore,
    InstanceState, NewEntry, QueryOptions,
};

fn engine() -> CorrelationEngine<InMemoryStore> {
    CorrelationEngine::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(ClaimsAuthorizer::default()),
        &EngineConfig::default(),
    )
}

fn alice() -> Identity {
    Identity::new("alice", "token-alice")
}

fn bob() -> Identity {
    Identity::new("bob", "token-bob")
}

fn auditor() -> Identity {
    Identity::new("auditor", "token-auditor").with_claim("correlation:read_all")
}

fn operator() -> Identity {
    Identity::new("operator", "token-operator")
        .with_claim("correlation:manage")
        .with_claim("correlation:purge")
}

/// Interleave alice's and bob's correlations: a0 b0 a1 b1 ...
async fn interleaved(engine: &CorrelationEngine<InMemoryStore>, each: usize) {
    for i in 0..each {
        engine
            .registry
            .create_entry(&alice(), NewEntry::new(format!("a{i}"), format!("pa{i}"), "m1", "h1"))
            .await
            .unwrap();
        engine
            .registry
            .create_entry(&bob(), NewEntry::new(format!("b{i}"), format!("pb{i}"), "m1", "h1"))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn invisible_records_do_not_take_page_slots() {
    let engine = engine();
    interleaved(&engine, 6).await;

    let page: Vec<String> = engine
        .queries
        .get_all(&alice(), QueryOptions::new(2, 3))
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.correlation_id)
        .collect();
    assert_eq!(page, ["a2", "a3", "a4"]);

    let instances: Vec<String> = engine
        .queries
        .get_process_instances_by_state(&bob(), InstanceState::Running, QueryOptions::new(0, 4))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.process_instance_id)
        .collect();
    assert_eq!(instances, ["pb0", "pb1", "pb2", "pb3"]);
}

#[tokio::test]
async fn read_all_claim_sees_every_owner() {
    let engine = engine();
    interleaved(&engine, 3).await;
    let all = engine
        .queries
        .get_by_process_model_id(&auditor(), "m1", QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 6);
}

#[tokio::test]
async fn invisible_record_reads_as_not_found() {
    let engine = engine();
    interleaved(&engine, 1).await;

    let correlation = engine
        .queries
        .get_by_correlation_id(&bob(), "a0")
        .await
        .unwrap_err();
    assert!(matches!(correlation, CorrelationError::NotFound { .. }));

    let instance = engine
        .queries
        .get_by_process_instance_id(&bob(), "pa0")
        .await
        .unwrap_err();
    assert!(matches!(instance, CorrelationError::NotFound { .. }));

    let children = engine
        .queries
        .get_subprocesses_for_process_instance(&bob(), "pa0", QueryOptions::default())
        .await
        .unwrap_err();
    assert_eq!(children.kind(), "not_found");
}

#[tokio::test]
async fn correlation_view_hides_foreign_members() {
    let engine = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("shared", "p1", "m1", "h1"))
        .await
        .unwrap();
    // The auditor can read the correlation, so it may join it.
    engine
        .registry
        .create_entry(&auditor(), NewEntry::new("shared", "p-aud", "m1", "h1"))
        .await
        .unwrap();

    let auditor_view = engine
        .queries
        .get_by_correlation_id(&auditor(), "shared")
        .await
        .unwrap();
    assert_eq!(auditor_view.process_instances.len(), 2);

    let mine = engine
        .queries
        .get_by_correlation_id(&alice(), "shared")
        .await
        .unwrap();
    let ids: Vec<&str> = mine
        .process_instances
        .iter()
        .map(|p| p.process_instance_id.as_str())
        .collect();
    assert_eq!(ids, ["p1"]);
}

#[tokio::test]
async fn cannot_join_a_foreign_correlation() {
    let engine = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    let err = engine
        .registry
        .create_entry(&bob(), NewEntry::new("c1", "p2", "m1", "h1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::Forbidden { ref action, .. } if action == "join"));
}

#[tokio::test]
async fn invisible_parent_is_invalid_reference() {
    let engine = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    let err = engine
        .registry
        .create_entry(&bob(), NewEntry::new("c2", "p2", "m1", "h1").with_parent("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::InvalidReference { .. }));
}

#[tokio::test]
async fn anonymous_identity_cannot_create() {
    let engine = engine();
    let err = engine
        .registry
        .create_entry(&Identity::default(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "forbidden");
}

#[tokio::test]
async fn only_owner_or_manager_may_finish() {
    let engine = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p2", "m1", "h1"))
        .await
        .unwrap();

    let denied = engine
        .registry
        .finish_process_instance(&bob(), "c1", "p1")
        .await
        .unwrap_err();
    assert!(matches!(denied, CorrelationError::Forbidden { .. }));

    engine
        .registry
        .finish_process_instance(&alice(), "c1", "p1")
        .await
        .unwrap();
    let managed = engine
        .registry
        .finish_process_instance(&operator(), "c1", "p2")
        .await
        .unwrap();
    assert_eq!(managed.state, InstanceState::Finished);
}

#[tokio::test]
async fn purge_requires_purge_claim() {
    let engine = engine();
    engine
        .registry
        .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
        .await
        .unwrap();

    let denied = engine
        .registry
        .delete_correlation_by_process_model_id(&alice(), "m1")
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), "forbidden");
    assert!(engine
        .queries
        .get_by_process_instance_id(&alice(), "p1")
        .await
        .is_ok());

    let summary = engine
        .registry
        .delete_correlation_by_process_model_id(&operator(), "m1")
        .await
        .unwrap();
    assert_eq!(summary.process_instance_ids, ["p1"]);
}
