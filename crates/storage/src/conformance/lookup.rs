use std::future::Future;

use super::{expect_not_found, seed, TestResult};
use crate::{CorrelationState, CorrelationStore, RecordKind, StoreError, Termination};

pub(super) async fn run_lookup_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "lookup",
        "get_correlation_nonexistent",
        get_correlation_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "lookup",
        "get_process_instance_not_found_has_correct_fields",
        get_process_instance_not_found_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "lookup",
        "correlation_members_nonexistent",
        correlation_members_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "lookup",
        "correlation_active_while_any_running",
        correlation_active_while_any_running(factory).await,
    ));
    results.push(TestResult::from_result(
        "lookup",
        "correlation_finished_when_all_finished",
        correlation_finished_when_all_finished(factory).await,
    ));
    results.push(TestResult::from_result(
        "lookup",
        "correlation_error_when_any_errored",
        correlation_error_when_any_errored(factory).await,
    ));

    results
}

async fn get_correlation_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found(s.get_correlation("c-999").await)
}

async fn get_process_instance_not_found_has_correct_fields<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_process_instance("p-999").await {
        Err(StoreError::NotFound {
            kind: RecordKind::ProcessInstance,
            key,
        }) if key == "p-999" => Ok(()),
        other => Err(format!(
            "expected NotFound(process instance, p-999), got {:?}",
            other
        )),
    }
}

async fn correlation_members_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    expect_not_found(s.correlation_members("c-999").await)
}

/// One finished and one running instance: still active.
async fn correlation_active_while_any_running<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c1", "m1", Some("p1")).await?;
    s.update_process_instance_state("p1", 0, Termination::Finished, "2025-01-01T00:01:00Z")
        .await
        .map_err(|e| e.to_string())?;

    let state = s
        .correlation_members("c1")
        .await
        .map_err(|e| e.to_string())?
        .state;
    if state != CorrelationState::Active {
        return Err(format!("expected Active, got {:?}", state));
    }
    Ok(())
}

async fn correlation_finished_when_all_finished<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c1", "m1", None).await?;
    for id in ["p1", "p2"] {
        s.update_process_instance_state(id, 0, Termination::Finished, "2025-01-01T00:01:00Z")
            .await
            .map_err(|e| e.to_string())?;
    }

    let state = s
        .correlation_members("c1")
        .await
        .map_err(|e| e.to_string())?
        .state;
    if state != CorrelationState::Finished {
        return Err(format!("expected Finished, got {:?}", state));
    }
    Ok(())
}

/// No instance running and one errored: the correlation is in error.
async fn correlation_error_when_any_errored<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c1", "m1", None).await?;
    s.update_process_instance_state("p1", 0, Termination::Finished, "2025-01-01T00:01:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.update_process_instance_state(
        "p2",
        0,
        Termination::Error(serde_json::json!({"code": "boom"})),
        "2025-01-01T00:01:00Z",
    )
    .await
    .map_err(|e| e.to_string())?;

    let state = s
        .correlation_members("c1")
        .await
        .map_err(|e| e.to_string())?
        .state;
    if state != CorrelationState::Error {
        return Err(format!("expected Error, got {:?}", state));
    }
    Ok(())
}
