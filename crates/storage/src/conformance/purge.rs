use std::future::Future;

use super::{all_instances, expect_not_found, instance_ids, seed, TestResult};
use crate::{CorrelationQuery, CorrelationStore, InstanceQuery, ScanWindow};

pub(super) async fn run_purge_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "purge",
        "purge_removes_exclusive_correlations",
        purge_removes_exclusive_correlations(factory).await,
    ));
    results.push(TestResult::from_result(
        "purge",
        "purge_keeps_mixed_correlations_whole",
        purge_keeps_mixed_correlations_whole(factory).await,
    ));
    results.push(TestResult::from_result(
        "purge",
        "purge_clears_model_indexes",
        purge_clears_model_indexes(factory).await,
    ));
    results.push(TestResult::from_result(
        "purge",
        "purge_is_idempotent",
        purge_is_idempotent(factory).await,
    ));
    results.push(TestResult::from_result(
        "purge",
        "purge_unknown_model_is_empty",
        purge_unknown_model_is_empty(factory).await,
    ));

    results
}

async fn purge_removes_exclusive_correlations<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c1", "m1", Some("p1")).await?;
    seed(&s, "p3", "c2", "m2", None).await?;

    let summary = s
        .purge_process_model("m1")
        .await
        .map_err(|e| e.to_string())?;
    if summary.correlation_ids != ["c1"] {
        return Err(format!("expected [c1] purged, got {:?}", summary.correlation_ids));
    }
    if summary.process_instance_ids != ["p1", "p2"] {
        return Err(format!(
            "expected [p1, p2] purged, got {:?}",
            summary.process_instance_ids
        ));
    }
    expect_not_found(s.get_correlation("c1").await)?;
    expect_not_found(s.get_process_instance("p1").await)?;
    expect_not_found(s.get_process_instance("p2").await)?;
    s.get_process_instance("p3")
        .await
        .map(|_| ())
        .map_err(|e| format!("unrelated instance removed: {e}"))
}

/// A correlation holding instances of several models is left untouched.
async fn purge_keeps_mixed_correlations_whole<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c1", "m2", Some("p1")).await?;

    let summary = s
        .purge_process_model("m1")
        .await
        .map_err(|e| e.to_string())?;
    if !summary.is_empty() {
        return Err(format!("expected nothing purged, got {:?}", summary));
    }
    let remaining = s
        .scan_process_instances(
            &InstanceQuery::ByCorrelation("c1".to_string()),
            &all_instances,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    if instance_ids(&remaining) != ["p1", "p2"] {
        return Err(format!("expected [p1, p2] kept, got {:?}", instance_ids(&remaining)));
    }
    Ok(())
}

async fn purge_clears_model_indexes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    s.purge_process_model("m1")
        .await
        .map_err(|e| e.to_string())?;

    let by_model = s
        .scan_correlations(
            &CorrelationQuery::ByProcessModel("m1".to_string()),
            &super::all_correlations,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    let active = s
        .scan_correlations(
            &CorrelationQuery::Active,
            &super::all_correlations,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    let instances = s
        .scan_process_instances(
            &InstanceQuery::ByProcessModel("m1".to_string()),
            &all_instances,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    if !by_model.is_empty() || !active.is_empty() || !instances.is_empty() {
        return Err("indexes still reference purged records".to_string());
    }
    Ok(())
}

async fn purge_is_idempotent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    s.purge_process_model("m1")
        .await
        .map_err(|e| e.to_string())?;
    let again = s
        .purge_process_model("m1")
        .await
        .map_err(|e| format!("repeat purge failed: {e}"))?;
    if !again.is_empty() {
        return Err(format!("repeat purge removed {:?}", again));
    }
    Ok(())
}

async fn purge_unknown_model_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let summary = s
        .purge_process_model("m-unknown")
        .await
        .map_err(|e| e.to_string())?;
    if !summary.is_empty() {
        return Err(format!("expected empty summary, got {:?}", summary));
    }
    Ok(())
}
