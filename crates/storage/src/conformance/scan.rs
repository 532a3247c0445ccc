use std::future::Future;

use super::{
    all_correlations, all_instances, correlation_ids, instance_ids, seed, TestResult,
};
use crate::{
    CorrelationQuery, CorrelationRecord, CorrelationStore, InstanceQuery, InstanceState,
    ProcessInstanceRecord, ScanWindow, Termination,
};

pub(super) async fn run_scan_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "scan",
        "scan_empty_store_returns_empty",
        scan_empty_store_returns_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "scan_all_in_insertion_order",
        scan_all_in_insertion_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "scan_window_is_slice_of_full_order",
        scan_window_is_slice_of_full_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "scan_offset_past_end_returns_empty",
        scan_offset_past_end_returns_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "predicate_applied_before_window",
        predicate_applied_before_window(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "active_correlations_follow_running_instances",
        active_correlations_follow_running_instances(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "correlations_by_process_model",
        correlations_by_process_model(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "instances_by_correlation_model_and_state",
        instances_by_correlation_model_and_state(factory).await,
    ));
    results.push(TestResult::from_result(
        "scan",
        "children_are_direct_only",
        children_are_direct_only(factory).await,
    ));

    results
}

async fn scan_empty_store_returns_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let corrs = s
        .scan_correlations(&CorrelationQuery::All, &all_correlations, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    let insts = s
        .scan_process_instances(
            &InstanceQuery::ChildrenOf("nobody".to_string()),
            &all_instances,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    if !corrs.is_empty() || !insts.is_empty() {
        return Err("expected empty scans".to_string());
    }
    Ok(())
}

async fn scan_all_in_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    // Ids not in lexical order.
    seed(&s, "p-z", "c-z", "m1", None).await?;
    seed(&s, "p-a", "c-a", "m1", None).await?;
    seed(&s, "p-m", "c-z", "m1", None).await?;

    let corrs = s
        .scan_correlations(&CorrelationQuery::All, &all_correlations, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    if correlation_ids(&corrs) != ["c-z", "c-a"] {
        return Err(format!("unexpected correlation order {:?}", correlation_ids(&corrs)));
    }
    let insts = s
        .scan_process_instances(&InstanceQuery::All, &all_instances, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    if instance_ids(&insts) != ["p-z", "p-a", "p-m"] {
        return Err(format!("unexpected instance order {:?}", instance_ids(&insts)));
    }
    Ok(())
}

/// `offset=k, limit=m` equals the slice `[k, k+m)` of the unbounded scan.
async fn scan_window_is_slice_of_full_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 0..7 {
        seed(&s, &format!("p{i}"), "c1", "m1", None).await?;
    }
    let full = s
        .scan_process_instances(&InstanceQuery::All, &all_instances, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    let page = s
        .scan_process_instances(&InstanceQuery::All, &all_instances, ScanWindow::new(2, 3))
        .await
        .map_err(|e| e.to_string())?;
    if instance_ids(&page) != instance_ids(&full[2..5]) {
        return Err(format!(
            "page {:?} is not slice {:?}",
            instance_ids(&page),
            instance_ids(&full[2..5])
        ));
    }
    let tail = s
        .scan_process_instances(&InstanceQuery::All, &all_instances, ScanWindow::new(5, 10))
        .await
        .map_err(|e| e.to_string())?;
    if tail.len() != 2 {
        return Err(format!("expected 2 trailing records, got {}", tail.len()));
    }
    Ok(())
}

async fn scan_offset_past_end_returns_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let page = s
        .scan_correlations(&CorrelationQuery::All, &all_correlations, ScanWindow::new(5, 10))
        .await
        .map_err(|e| e.to_string())?;
    if !page.is_empty() {
        return Err(format!("expected empty page, got {:?}", correlation_ids(&page)));
    }
    Ok(())
}

/// Rejected records must not occupy window slots.
async fn predicate_applied_before_window<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 0..6 {
        seed(&s, &format!("p{i}"), &format!("c{i}"), "m1", None).await?;
    }
    let odd = |r: &CorrelationRecord| {
        r.correlation_id
            .trim_start_matches('c')
            .parse::<u32>()
            .map(|n| n % 2 == 1)
            .unwrap_or(false)
    };
    let page = s
        .scan_correlations(&CorrelationQuery::All, &odd, ScanWindow::new(0, 2))
        .await
        .map_err(|e| e.to_string())?;
    if correlation_ids(&page) != ["c1", "c3"] {
        return Err(format!("expected [c1, c3], got {:?}", correlation_ids(&page)));
    }
    let next = s
        .scan_correlations(&CorrelationQuery::All, &odd, ScanWindow::new(2, 2))
        .await
        .map_err(|e| e.to_string())?;
    if correlation_ids(&next) != ["c5"] {
        return Err(format!("expected [c5], got {:?}", correlation_ids(&next)));
    }
    Ok(())
}

async fn active_correlations_follow_running_instances<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c2", "m1", None).await?;
    seed(&s, "p3", "c2", "m1", None).await?;
    s.update_process_instance_state("p1", 0, Termination::Finished, "2025-01-01T00:01:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.update_process_instance_state("p2", 0, Termination::Finished, "2025-01-01T00:01:00Z")
        .await
        .map_err(|e| e.to_string())?;

    let active = s
        .scan_correlations(&CorrelationQuery::Active, &all_correlations, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    if correlation_ids(&active) != ["c2"] {
        return Err(format!("expected [c2] active, got {:?}", correlation_ids(&active)));
    }

    s.update_process_instance_state("p3", 0, Termination::Finished, "2025-01-01T00:01:00Z")
        .await
        .map_err(|e| e.to_string())?;
    let active = s
        .scan_correlations(&CorrelationQuery::Active, &all_correlations, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    if !active.is_empty() {
        return Err(format!("expected no active, got {:?}", correlation_ids(&active)));
    }
    let all = s
        .scan_correlations(&CorrelationQuery::All, &all_correlations, ScanWindow::unbounded())
        .await
        .map_err(|e| e.to_string())?;
    if all.len() != 2 {
        return Err(format!("finished correlations must remain, got {}", all.len()));
    }
    Ok(())
}

async fn correlations_by_process_model<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c2", "m2", None).await?;
    seed(&s, "p3", "c3", "m2", None).await?;
    seed(&s, "p4", "c3", "m1", None).await?;

    let m1 = s
        .scan_correlations(
            &CorrelationQuery::ByProcessModel("m1".to_string()),
            &all_correlations,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    if correlation_ids(&m1) != ["c1", "c3"] {
        return Err(format!("expected [c1, c3], got {:?}", correlation_ids(&m1)));
    }
    Ok(())
}

async fn instances_by_correlation_model_and_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c2", "m2", None).await?;
    seed(&s, "p3", "c1", "m2", None).await?;
    s.update_process_instance_state(
        "p3",
        0,
        Termination::Error(serde_json::json!("failed")),
        "2025-01-01T00:01:00Z",
    )
    .await
    .map_err(|e| e.to_string())?;

    let cases: Vec<(InstanceQuery, Vec<&str>)> = vec![
        (InstanceQuery::ByCorrelation("c1".to_string()), vec!["p1", "p3"]),
        (InstanceQuery::ByProcessModel("m2".to_string()), vec!["p2", "p3"]),
        (InstanceQuery::ByState(InstanceState::Running), vec!["p1", "p2"]),
        (InstanceQuery::ByState(InstanceState::Error), vec!["p3"]),
        (InstanceQuery::ByState(InstanceState::Finished), vec![]),
    ];
    for (query, expected) in cases {
        let found: Vec<ProcessInstanceRecord> = s
            .scan_process_instances(&query, &all_instances, ScanWindow::unbounded())
            .await
            .map_err(|e| e.to_string())?;
        if instance_ids(&found) != expected {
            return Err(format!(
                "{:?}: expected {:?}, got {:?}",
                query,
                expected,
                instance_ids(&found)
            ));
        }
    }
    Ok(())
}

async fn children_are_direct_only<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "root", "c1", "m1", None).await?;
    seed(&s, "child-a", "c1", "m1", Some("root")).await?;
    seed(&s, "child-b", "c1", "m1", Some("root")).await?;
    seed(&s, "grandchild", "c1", "m1", Some("child-a")).await?;

    let children = s
        .scan_process_instances(
            &InstanceQuery::ChildrenOf("root".to_string()),
            &all_instances,
            ScanWindow::unbounded(),
        )
        .await
        .map_err(|e| e.to_string())?;
    if instance_ids(&children) != ["child-a", "child-b"] {
        return Err(format!(
            "expected [child-a, child-b], got {:?}",
            instance_ids(&children)
        ));
    }
    Ok(())
}
