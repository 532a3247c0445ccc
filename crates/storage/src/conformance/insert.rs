use std::future::Future;

use super::{all_correlations, make_correlation, make_instance, seed, TestResult};
use crate::{CorrelationRecord, CorrelationStore, InstanceState, RecordKind, StoreError};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "insert_creates_missing_correlation",
        insert_creates_missing_correlation(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_reuses_existing_correlation",
        insert_reuses_existing_correlation(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "inserted_instance_readable_unchanged",
        inserted_instance_readable_unchanged(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_instance_returns_duplicate_key",
        duplicate_instance_returns_duplicate_key(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_across_correlations_rejected",
        duplicate_across_correlations_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "dangling_parent_rejected",
        dangling_parent_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "dangling_parent_writes_nothing",
        dangling_parent_writes_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "parent_may_live_in_other_correlation",
        parent_may_live_in_other_correlation(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "join_guard_rejects_existing_correlation",
        join_guard_rejects_existing_correlation(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "join_guard_rejection_writes_nothing",
        join_guard_rejection_writes_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "join_guard_ignored_for_new_correlation",
        join_guard_ignored_for_new_correlation(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "sequence_assigned_by_store",
        sequence_assigned_by_store(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// First entry for an unseen correlation id creates the correlation.
async fn insert_creates_missing_correlation<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let outcome = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p1", "c1", "m1", None),
            &all_correlations,
        )
        .await
        .map_err(|e| e.to_string())?;
    if !outcome.correlation_created {
        return Err("expected correlation_created = true".to_string());
    }
    let corr = s.get_correlation("c1").await.map_err(|e| e.to_string())?;
    if corr.correlation_id != "c1" {
        return Err(format!("expected c1, got {}", corr.correlation_id));
    }
    Ok(())
}

/// A second entry in the same correlation keeps the original correlation record.
async fn insert_reuses_existing_correlation<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let before = s.get_correlation("c1").await.map_err(|e| e.to_string())?;

    let mut other = make_correlation("c1");
    other.created_at = "2030-01-01T00:00:00Z".to_string();
    let outcome = s
        .insert_entry(other, make_instance("p2", "c1", "m1", None), &all_correlations)
        .await
        .map_err(|e| e.to_string())?;
    if outcome.correlation_created {
        return Err("expected correlation_created = false".to_string());
    }

    let after = s.get_correlation("c1").await.map_err(|e| e.to_string())?;
    if after != before {
        return Err(format!("correlation changed: {:?} -> {:?}", before, after));
    }
    Ok(())
}

/// The stored instance equals the inserted fields, running at version 0.
async fn inserted_instance_readable_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c1", "m2", Some("p1")).await?;

    let rec = s
        .get_process_instance("p2")
        .await
        .map_err(|e| e.to_string())?;
    if rec.correlation_id != "c1"
        || rec.process_model_id != "m2"
        || rec.process_model_hash != "m2-hash"
        || rec.parent_process_instance_id.as_deref() != Some("p1")
    {
        return Err(format!("fields differ from insert: {:?}", rec));
    }
    if rec.state != InstanceState::Running || rec.version != 0 || rec.error.is_some() {
        return Err(format!("expected fresh running record, got {:?}", rec));
    }
    Ok(())
}

/// Inserting the same process instance id twice returns DuplicateKey.
async fn duplicate_instance_returns_duplicate_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let result = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p1", "c1", "m1", None),
            &all_correlations,
        )
        .await;
    match result {
        Err(StoreError::DuplicateKey {
            kind: RecordKind::ProcessInstance,
            key,
        }) if key == "p1" => Ok(()),
        other => Err(format!("expected DuplicateKey for p1, got {:?}", other)),
    }
}

/// Instance ids are unique across the whole store, not per correlation.
/// The rejected insert must not create its correlation.
async fn duplicate_across_correlations_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let result = s
        .insert_entry(
            make_correlation("c2"),
            make_instance("p1", "c2", "m1", None),
            &all_correlations,
        )
        .await;
    if !matches!(result, Err(StoreError::DuplicateKey { .. })) {
        return Err(format!("expected DuplicateKey, got {:?}", result));
    }
    super::expect_not_found(s.get_correlation("c2").await)
}

/// A parent id that does not resolve returns DanglingReference.
async fn dangling_parent_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p1", "c1", "m1", Some("ghost")),
            &all_correlations,
        )
        .await;
    match result {
        Err(StoreError::DanglingReference { key, .. }) if key == "ghost" => Ok(()),
        other => Err(format!("expected DanglingReference for ghost, got {:?}", other)),
    }
}

/// A rejected insert leaves neither the instance nor the correlation behind.
async fn dangling_parent_writes_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let _ = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p1", "c1", "m1", Some("ghost")),
            &all_correlations,
        )
        .await;
    super::expect_not_found(s.get_process_instance("p1").await)?;
    super::expect_not_found(s.get_correlation("c1").await)
}

/// Subprocesses may reference a parent in a different correlation.
async fn parent_may_live_in_other_correlation<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    seed(&s, "p2", "c2", "m1", Some("p1")).await?;
    let rec = s
        .get_process_instance("p2")
        .await
        .map_err(|e| e.to_string())?;
    if rec.correlation_id != "c2" {
        return Err(format!("expected c2, got {}", rec.correlation_id));
    }
    Ok(())
}

/// The guard sees the stored correlation, not the one carried by the insert.
async fn join_guard_rejects_existing_correlation<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;

    let mut mine = make_correlation("c1");
    mine.owner.subject = "intruder".to_string();
    let guard = |existing: &CorrelationRecord| existing.owner.subject == "intruder";
    match s
        .insert_entry(mine, make_instance("p2", "c1", "m1", None), &guard)
        .await
    {
        Err(StoreError::JoinRejected { key }) if key == "c1" => Ok(()),
        other => Err(format!("expected JoinRejected for c1, got {:?}", other)),
    }
}

async fn join_guard_rejection_writes_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "p1", "c1", "m1", None).await?;
    let before = s.correlation_members("c1").await.map_err(|e| e.to_string())?;

    let _ = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p2", "c1", "m2", Some("p1")),
            &|_: &CorrelationRecord| false,
        )
        .await;
    super::expect_not_found(s.get_process_instance("p2").await)?;
    let after = s.correlation_members("c1").await.map_err(|e| e.to_string())?;
    if after.process_instances.len() != before.process_instances.len() {
        return Err(format!(
            "member count changed: {} -> {}",
            before.process_instances.len(),
            after.process_instances.len()
        ));
    }
    Ok(())
}

/// Creating a correlation is not a join; the guard has nothing to refuse.
async fn join_guard_ignored_for_new_correlation<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let outcome = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p1", "c1", "m1", None),
            &|_: &CorrelationRecord| false,
        )
        .await
        .map_err(|e| e.to_string())?;
    if !outcome.correlation_created {
        return Err("expected correlation_created = true".to_string());
    }
    Ok(())
}

/// Caller-supplied sequences are ignored; the store assigns increasing ones.
async fn sequence_assigned_by_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut first = make_instance("p1", "c1", "m1", None);
    first.sequence = 999;
    let a = s
        .insert_entry(make_correlation("c1"), first, &all_correlations)
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .insert_entry(
            make_correlation("c1"),
            make_instance("p2", "c1", "m1", None),
            &all_correlations,
        )
        .await
        .map_err(|e| e.to_string())?;
    if b.instance.sequence <= a.instance.sequence {
        return Err(format!(
            "expected increasing sequences, got {} then {}",
            a.instance.sequence, b.instance.sequence
        ));
    }
    Ok(())
}
