use std::future::Future;
use std::sync::Arc;

use super::{all_correlations, make_correlation, make_instance, seed, TestResult};
use crate::{CorrelationRecord, CorrelationStore, StoreError, Termination};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_insert_exactly_one_wins",
        concurrent_insert_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_transitions_exactly_one_wins",
        concurrent_transitions_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_same_correlation_all_succeed",
        concurrent_inserts_same_correlation_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_guarded_joins_only_creator_wins",
        concurrent_guarded_joins_only_creator_wins(factory).await,
    ));

    results
}

// ── Concurrent insert: exactly one wins ─────────────────────────────────────

/// N tasks each attempt to insert the same process instance id. Exactly one
/// succeeds; the rest must get DuplicateKey.
async fn concurrent_insert_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            // Each racer names a different correlation; only the winner's may exist.
            let correlation_id = format!("c-{i}");
            match s
                .insert_entry(
                    make_correlation(&correlation_id),
                    make_instance("p1", &correlation_id, "m1", None),
                    &all_correlations,
                )
                .await
            {
                Ok(_) => Ok(true),
                Err(StoreError::DuplicateKey { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StoreError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let rec = storage
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    for i in 0..N {
        let correlation_id = format!("c-{i}");
        let exists = storage.get_correlation(&correlation_id).await.is_ok();
        if exists != (rec.correlation_id == correlation_id) {
            return Err(format!(
                "correlation {correlation_id} exists={exists} but winner is {}",
                rec.correlation_id
            ));
        }
    }
    Ok(())
}

// ── Concurrent transition: exactly one wins ─────────────────────────────────

/// N tasks race to finish the same instance from version 0. Exactly one
/// succeeds; the rest must get ConcurrentConflict.
async fn concurrent_transitions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(&*storage, "p1", "c1", "m1", None).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let termination = if i % 2 == 0 {
                Termination::Finished
            } else {
                Termination::Error(serde_json::json!({ "racer": i }))
            };
            match s
                .update_process_instance_state("p1", 0, termination, "2025-01-01T00:05:00Z")
                .await
            {
                Ok(_) => Ok(true),
                Err(StoreError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StoreError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let rec = storage
        .get_process_instance("p1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.version != 1 {
        return Err(format!("expected version 1 after race, got {}", rec.version));
    }
    Ok(())
}

/// N tasks insert distinct instances into one correlation; all succeed and
/// the correlation is created exactly once.
async fn concurrent_inserts_same_correlation_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.insert_entry(
                make_correlation("c1"),
                make_instance(&format!("p{i}"), "c1", "m1", None),
                &all_correlations,
            )
            .await
            .map(|outcome| outcome.correlation_created)
        }));
    }

    let mut created = 0usize;
    for handle in handles {
        let was_created = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if was_created {
            created += 1;
        }
    }
    if created != 1 {
        return Err(format!("expected correlation created once, got {created}"));
    }
    Ok(())
}

/// N owners race to enter one correlation, each refusing to join a
/// correlation owned by someone else. Only the creator gets in.
async fn concurrent_guarded_joins_only_creator_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let subject = format!("owner-{i}");
            let mut correlation = make_correlation("c1");
            correlation.owner.subject = subject.clone();
            let mut instance = make_instance(&format!("p{i}"), "c1", "m1", None);
            instance.owner.subject = subject.clone();
            let guard = move |existing: &CorrelationRecord| existing.owner.subject == subject;
            match s.insert_entry(correlation, instance, &guard).await {
                Ok(outcome) => Ok(Some(outcome.correlation_created)),
                Err(StoreError::JoinRejected { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        }));
    }

    let mut entered = 0usize;
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StoreError| format!("storage error: {e}"))?;
        match outcome {
            Some(true) => entered += 1,
            Some(false) => return Err("a racer joined a foreign correlation".to_string()),
            None => {}
        }
    }
    if entered != 1 {
        return Err(format!("expected exactly one creator, got {entered}"));
    }

    let owner = storage
        .get_correlation("c1")
        .await
        .map_err(|e| e.to_string())?
        .owner
        .subject;
    let members = storage
        .correlation_members("c1")
        .await
        .map_err(|e| e.to_string())?
        .process_instances;
    if members.len() != 1 || members[0].owner.subject != owner {
        return Err(format!(
            "expected only {owner}'s instance in c1, got {:?}",
            members.iter().map(|m| &m.process_instance_id).collect::<Vec<_>>()
        ));
    }
    Ok(())
}
