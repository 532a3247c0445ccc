use std::future::Future;

use super::{expect_not_found, seed, TestResult};
use crate::{CorrelationStore, InstanceState, StoreError, Termination};

const FINISHED_AT: &str = "2025-01-01T00:05:00Z";

pub(super) async fn run_transition_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "transition",
        "finish_sets_state_and_increments_version",
        finish_sets_state_and_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "error_stores_payload",
        error_stores_payload(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "update_nonexistent_returns_not_found",
        update_nonexistent_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "stale_version_returns_conflict",
        stale_version_returns_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "conflict_has_correct_fields",
        conflict_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "conflict_does_not_change_record",
        conflict_does_not_change_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "transition",
        "update_returns_stored_record",
        update_returns_stored_record(factory).await,
    ));

    results
}

async fn finish_sets_state_and_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    s.update_process_instance_state("p1", 0, Termination::Finished, FINISHED_AT)
        .await
        .map_err(|e| e.to_string())?;

    let rec = s
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.state != InstanceState::Finished {
        return Err(format!("expected finished, got {}", rec.state));
    }
    if rec.version != 1 {
        return Err(format!("expected version 1, got {}", rec.version));
    }
    if rec.finished_at.as_deref() != Some(FINISHED_AT) {
        return Err(format!("expected finished_at {FINISHED_AT}, got {:?}", rec.finished_at));
    }
    if rec.error.is_some() {
        return Err("finished instance must not carry an error".to_string());
    }
    Ok(())
}

async fn error_stores_payload<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let payload = serde_json::json!({"code": 500, "message": "service task failed"});
    s.update_process_instance_state("p1", 0, Termination::Error(payload.clone()), FINISHED_AT)
        .await
        .map_err(|e| e.to_string())?;

    let rec = s
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.state != InstanceState::Error {
        return Err(format!("expected error, got {}", rec.state));
    }
    if rec.error.as_ref() != Some(&payload) {
        return Err(format!("expected payload {payload}, got {:?}", rec.error));
    }
    Ok(())
}

async fn update_nonexistent_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found(
        s.update_process_instance_state("p-999", 0, Termination::Finished, FINISHED_AT)
            .await,
    )
}

/// A second update using the pre-transition version must conflict.
async fn stale_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    s.update_process_instance_state("p1", 0, Termination::Finished, FINISHED_AT)
        .await
        .map_err(|e| e.to_string())?;
    let second = s
        .update_process_instance_state(
            "p1",
            0,
            Termination::Error(serde_json::json!("late")),
            FINISHED_AT,
        )
        .await;
    match second {
        Err(StoreError::ConcurrentConflict { .. }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}

async fn conflict_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let result = s
        .update_process_instance_state("p1", 7, Termination::Finished, FINISHED_AT)
        .await;
    match result {
        Err(StoreError::ConcurrentConflict {
            key,
            expected_version,
        }) => {
            if key != "p1" {
                return Err(format!("expected key p1, got {key}"));
            }
            if expected_version != 7 {
                return Err(format!("expected version 7, got {expected_version}"));
            }
            Ok(())
        }
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}

async fn conflict_does_not_change_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let before = s
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s
        .update_process_instance_state("p1", 3, Termination::Finished, FINISHED_AT)
        .await;
    let after = s
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    if before != after {
        return Err(format!("record changed on conflict: {:?} -> {:?}", before, after));
    }
    Ok(())
}

async fn update_returns_stored_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let returned = s
        .update_process_instance_state("p1", 0, Termination::Finished, FINISHED_AT)
        .await
        .map_err(|e| e.to_string())?;
    let stored = s
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    if returned != stored {
        return Err(format!("returned {:?} but stored {:?}", returned, stored));
    }
    Ok(())
}
