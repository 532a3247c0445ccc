use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{
    CorrelationMembers, CorrelationQuery, CorrelationRecord, EntryInsert, InstanceQuery,
    ProcessInstanceRecord, PurgeSummary, ScanWindow, Termination,
};

/// Caller-supplied predicate applied to scan candidates before the window.
pub type RecordPredicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// The storage trait for correlation tracking backends.
///
/// A `CorrelationStore` holds correlation and process instance records and
/// the secondary indexes needed to answer the registry's queries without
/// scanning every record.
///
/// ## Atomicity
///
/// Every method is a single atomic step against the store:
///
/// - `insert_entry` is a compare-and-insert. Two concurrent inserts of the
///   same process instance id must result in exactly one success and one
///   `StoreError::DuplicateKey`. The join guard sees the correlation as it
///   is at the moment of the write.
/// - `update_process_instance_state` is a conditional write:
///   `UPDATE WHERE version = expected_version`. If the version moved, the
///   method returns `StoreError::ConcurrentConflict` and writes nothing.
/// - `purge_process_model` is all-or-nothing.
/// - `correlation_members` reads the aggregate state and the member list in
///   one step, so a concurrent purge is observed entirely or not at all.
///
/// ## Ordering
///
/// Scans return records in store-assigned `sequence` order (insertion order).
/// The predicate is applied before `offset`/`limit`, so a window never
/// contains fewer than `limit` records because rejected records took slots.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// request handlers and async task boundaries.
#[async_trait]
pub trait CorrelationStore: Send + Sync + 'static {
    // ── Writes ───────────────────────────────────────────────────────────────

    /// Insert a process instance, creating its correlation if unseen.
    ///
    /// The correlation record is only used when no correlation with that id
    /// exists; otherwise the existing one is kept, provided `join_guard`
    /// accepts it. The guard is never called for a correlation created by
    /// this insert.
    ///
    /// Returns `Err(StoreError::DuplicateKey)` if the process instance id exists.
    /// Returns `Err(StoreError::DanglingReference)` if the parent id is set and
    /// does not resolve.
    /// Returns `Err(StoreError::JoinRejected)` if the correlation exists and
    /// `join_guard` refuses it. Nothing is written on error.
    async fn insert_entry(
        &self,
        correlation: CorrelationRecord,
        instance: ProcessInstanceRecord,
        join_guard: RecordPredicate<'_, CorrelationRecord>,
    ) -> Result<EntryInsert, StoreError>;

    /// Move a process instance to a terminal state (OCC).
    ///
    /// The write is conditional on `version = expected_version`.
    /// On success the stored version is incremented and the updated record
    /// is returned.
    ///
    /// Returns `Err(StoreError::NotFound)` if the instance does not exist.
    async fn update_process_instance_state(
        &self,
        process_instance_id: &str,
        expected_version: i64,
        termination: Termination,
        finished_at: &str,
    ) -> Result<ProcessInstanceRecord, StoreError>;

    /// Remove every correlation whose every process instance was created
    /// under `process_model_id`, together with those instances.
    ///
    /// Idempotent: once purged, a repeat call returns an empty summary.
    async fn purge_process_model(&self, process_model_id: &str)
        -> Result<PurgeSummary, StoreError>;

    // ── Lookups ──────────────────────────────────────────────────────────────

    /// Returns `Err(StoreError::NotFound)` if the correlation does not exist.
    async fn get_correlation(&self, correlation_id: &str)
        -> Result<CorrelationRecord, StoreError>;

    /// Returns `Err(StoreError::NotFound)` if the instance does not exist.
    async fn get_process_instance(
        &self,
        process_instance_id: &str,
    ) -> Result<ProcessInstanceRecord, StoreError>;

    /// Aggregate state of a correlation, read from the `(correlation, state)`
    /// index, together with its member instances.
    ///
    /// Returns `Err(StoreError::NotFound)` if the correlation does not exist.
    async fn correlation_members(&self, correlation_id: &str)
        -> Result<CorrelationMembers, StoreError>;

    // ── Scans ────────────────────────────────────────────────────────────────

    /// Scan correlations selected by `query`, keep those accepted by
    /// `predicate`, then apply `window`. Empty when nothing matches.
    async fn scan_correlations(
        &self,
        query: &CorrelationQuery,
        predicate: RecordPredicate<'_, CorrelationRecord>,
        window: ScanWindow,
    ) -> Result<Vec<CorrelationRecord>, StoreError>;

    /// Scan process instances selected by `query`, keep those accepted by
    /// `predicate`, then apply `window`. Empty when nothing matches.
    async fn scan_process_instances(
        &self,
        query: &InstanceQuery,
        predicate: RecordPredicate<'_, ProcessInstanceRecord>,
        window: ScanWindow,
    ) -> Result<Vec<ProcessInstanceRecord>, StoreError>;
}
