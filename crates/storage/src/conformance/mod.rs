//! Conformance test suite for `CorrelationStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `CorrelationStore` implementation can run to verify correctness. The
//! suite covers:
//!
//! - **Insert**: implicit correlation creation, duplicate and dangling-parent
//!   detection, join guards
//! - **Lookup**: not-found errors, aggregate correlation state and members
//! - **Scan**: index selection, insertion order, predicate-before-window paging
//! - **Transition**: OCC version checks on state updates
//! - **Purge**: all-or-nothing, model-exclusive removal and idempotence
//! - **Concurrency**: racing inserts and transitions have exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use correlation_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod insert;
mod lookup;
mod purge;
mod scan;
mod transition;

use std::fmt;
use std::future::Future;

use crate::record::{CorrelationRecord, Identity, InstanceState, ProcessInstanceRecord};
use crate::{CorrelationStore, StoreError};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "scan", "purge").
    pub category: String,
    /// Test name (e.g. "insert_creates_missing_correlation").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: CorrelationStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(lookup::run_lookup_tests(&factory).await);
    results.extend(scan::run_scan_tests(&factory).await);
    results.extend(transition::run_transition_tests(&factory).await);
    results.extend(purge::run_purge_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn owner() -> Identity {
    Identity::new("test-owner", "test-token")
}

fn make_correlation(correlation_id: &str) -> CorrelationRecord {
    CorrelationRecord {
        correlation_id: correlation_id.to_string(),
        owner: owner(),
        created_at: "2025-01-01T00:00:00Z".to_string(),
        sequence: 0,
    }
}

fn make_instance(
    process_instance_id: &str,
    correlation_id: &str,
    process_model_id: &str,
    parent: Option<&str>,
) -> ProcessInstanceRecord {
    ProcessInstanceRecord {
        process_instance_id: process_instance_id.to_string(),
        correlation_id: correlation_id.to_string(),
        process_model_id: process_model_id.to_string(),
        process_model_hash: format!("{process_model_id}-hash"),
        parent_process_instance_id: parent.map(str::to_string),
        state: InstanceState::Running,
        error: None,
        owner: owner(),
        created_at: "2025-01-01T00:00:00Z".to_string(),
        finished_at: None,
        version: 0,
        sequence: 0,
    }
}

/// Insert an entry built from the helpers above, mapping errors to strings.
async fn seed<S: CorrelationStore>(
    s: &S,
    process_instance_id: &str,
    correlation_id: &str,
    process_model_id: &str,
    parent: Option<&str>,
) -> Result<(), String> {
    s.insert_entry(
        make_correlation(correlation_id),
        make_instance(process_instance_id, correlation_id, process_model_id, parent),
        &all_correlations,
    )
    .await
    .map(|_| ())
    .map_err(|e| format!("seed {process_instance_id}: {e}"))
}

/// Accept-everything predicates for scans.
fn all_correlations(_: &CorrelationRecord) -> bool {
    true
}

fn all_instances(_: &ProcessInstanceRecord) -> bool {
    true
}

fn correlation_ids(records: &[CorrelationRecord]) -> Vec<String> {
    records.iter().map(|r| r.correlation_id.clone()).collect()
}

fn instance_ids(records: &[ProcessInstanceRecord]) -> Vec<String> {
    records.iter().map(|r| r.process_instance_id.clone()).collect()
}

fn expect_not_found<T: fmt::Debug>(result: Result<T, StoreError>) -> Result<(), String> {
    match result {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}
