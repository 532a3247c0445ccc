//! In-memory `CorrelationStore` backend.
//!
//! All tables live behind a single `tokio::sync::RwLock`. Every write takes
//! the write lock once and performs its checks and mutations under it, which
//! makes each trait method atomic. Reads take the read lock.
//!
//! Records are kept in primary tables keyed by id, plus an insertion-order
//! table keyed by `sequence`. Secondary indexes map a key to the set of
//! sequences it covers, so every scan walks a `BTreeSet<u64>` and yields
//! records in insertion order without sorting.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{RecordKind, StoreError};
use crate::record::{
    CorrelationMembers, CorrelationQuery, CorrelationRecord, CorrelationState, EntryInsert,
    InstanceQuery,
    InstanceState, ProcessInstanceRecord, PurgeSummary, ScanWindow, Termination,
};
use crate::traits::{CorrelationStore, RecordPredicate};

type SequenceSet = BTreeSet<u64>;

#[derive(Debug, Default)]
struct Tables {
    next_sequence: u64,

    correlations: HashMap<String, CorrelationRecord>,
    correlation_order: BTreeMap<u64, String>,
    instances: HashMap<String, ProcessInstanceRecord>,
    instance_order: BTreeMap<u64, String>,

    // Instance indexes (values are instance sequences).
    by_correlation: HashMap<String, SequenceSet>,
    by_model: HashMap<String, SequenceSet>,
    by_state: HashMap<InstanceState, SequenceSet>,
    by_parent: HashMap<String, SequenceSet>,
    by_correlation_state: HashMap<(String, InstanceState), SequenceSet>,

    // Correlation index (values are correlation sequences).
    correlations_by_model: HashMap<String, SequenceSet>,
}

fn index_insert<K: std::hash::Hash + Eq>(index: &mut HashMap<K, SequenceSet>, key: K, seq: u64) {
    index.entry(key).or_default().insert(seq);
}

fn index_remove<K: std::hash::Hash + Eq>(index: &mut HashMap<K, SequenceSet>, key: &K, seq: u64) {
    if let Some(set) = index.get_mut(key) {
        set.remove(&seq);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

fn index_members<K: std::hash::Hash + Eq>(index: &HashMap<K, SequenceSet>, key: &K) -> Vec<u64> {
    index
        .get(key)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
}

impl Tables {
    fn allocate_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn instance_at(&self, seq: u64) -> Option<&ProcessInstanceRecord> {
        self.instance_order
            .get(&seq)
            .and_then(|id| self.instances.get(id))
    }

    fn correlation_at(&self, seq: u64) -> Option<&CorrelationRecord> {
        self.correlation_order
            .get(&seq)
            .and_then(|id| self.correlations.get(id))
    }

    fn count(&self, correlation_id: &str, state: InstanceState) -> usize {
        self.by_correlation_state
            .get(&(correlation_id.to_string(), state))
            .map_or(0, |set| set.len())
    }

    fn correlation_candidates(&self, query: &CorrelationQuery) -> Vec<u64> {
        match query {
            CorrelationQuery::All => self.correlation_order.keys().copied().collect(),
            CorrelationQuery::ByProcessModel(model) => {
                index_members(&self.correlations_by_model, model)
            }
            CorrelationQuery::Active => {
                let running = self.by_state.get(&InstanceState::Running);
                let active: SequenceSet = running
                    .into_iter()
                    .flatten()
                    .filter_map(|seq| self.instance_at(*seq))
                    .filter_map(|inst| self.correlations.get(&inst.correlation_id))
                    .map(|corr| corr.sequence)
                    .collect();
                active.into_iter().collect()
            }
        }
    }

    fn instance_candidates(&self, query: &InstanceQuery) -> Vec<u64> {
        match query {
            InstanceQuery::All => self.instance_order.keys().copied().collect(),
            InstanceQuery::ByCorrelation(id) => index_members(&self.by_correlation, id),
            InstanceQuery::ByProcessModel(id) => index_members(&self.by_model, id),
            InstanceQuery::ByState(state) => index_members(&self.by_state, state),
            InstanceQuery::ChildrenOf(id) => index_members(&self.by_parent, id),
        }
    }

    fn index_instance(&mut self, record: &ProcessInstanceRecord, correlation_seq: u64) {
        let seq = record.sequence;
        index_insert(&mut self.by_correlation, record.correlation_id.clone(), seq);
        index_insert(&mut self.by_model, record.process_model_id.clone(), seq);
        index_insert(&mut self.by_state, record.state, seq);
        if let Some(parent) = &record.parent_process_instance_id {
            index_insert(&mut self.by_parent, parent.clone(), seq);
        }
        index_insert(
            &mut self.by_correlation_state,
            (record.correlation_id.clone(), record.state),
            seq,
        );
        index_insert(
            &mut self.correlations_by_model,
            record.process_model_id.clone(),
            correlation_seq,
        );
    }

    /// Drop an instance from the primary tables and every instance index.
    /// The correlation-level model index is handled by the caller.
    fn remove_instance(&mut self, seq: u64) -> Option<ProcessInstanceRecord> {
        let id = self.instance_order.remove(&seq)?;
        let record = self.instances.remove(&id)?;
        index_remove(&mut self.by_correlation, &record.correlation_id, seq);
        index_remove(&mut self.by_model, &record.process_model_id, seq);
        index_remove(&mut self.by_state, &record.state, seq);
        if let Some(parent) = &record.parent_process_instance_id {
            index_remove(&mut self.by_parent, parent, seq);
        }
        index_remove(
            &mut self.by_correlation_state,
            &(record.correlation_id.clone(), record.state),
            seq,
        );
        Some(record)
    }

    fn remove_correlation(&mut self, seq: u64) -> Option<CorrelationRecord> {
        let id = self.correlation_order.remove(&seq)?;
        self.by_correlation.remove(&id);
        self.correlations.remove(&id)
    }
}

/// Reference `CorrelationStore` keeping every record in process memory.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored correlations.
    pub async fn correlation_count(&self) -> usize {
        self.tables.read().await.correlations.len()
    }

    /// Number of stored process instances.
    pub async fn process_instance_count(&self) -> usize {
        self.tables.read().await.instances.len()
    }
}

#[async_trait]
impl CorrelationStore for InMemoryStore {
    async fn insert_entry(
        &self,
        mut correlation: CorrelationRecord,
        mut instance: ProcessInstanceRecord,
        join_guard: RecordPredicate<'_, CorrelationRecord>,
    ) -> Result<EntryInsert, StoreError> {
        if correlation.correlation_id != instance.correlation_id {
            return Err(StoreError::Backend(format!(
                "entry for process instance {} names correlation {} but carries record for {}",
                instance.process_instance_id, instance.correlation_id, correlation.correlation_id
            )));
        }

        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        if let Some(existing) = tables.correlations.get(&correlation.correlation_id) {
            if !join_guard(existing) {
                return Err(StoreError::JoinRejected {
                    key: correlation.correlation_id,
                });
            }
        }
        if tables.instances.contains_key(&instance.process_instance_id) {
            return Err(StoreError::DuplicateKey {
                kind: RecordKind::ProcessInstance,
                key: instance.process_instance_id,
            });
        }
        if let Some(parent) = &instance.parent_process_instance_id {
            if !tables.instances.contains_key(parent) {
                return Err(StoreError::DanglingReference {
                    kind: RecordKind::ProcessInstance,
                    key: parent.clone(),
                });
            }
        }

        let correlation_created = !tables.correlations.contains_key(&correlation.correlation_id);
        let correlation_seq = if correlation_created {
            let seq = tables.allocate_sequence();
            correlation.sequence = seq;
            tables
                .correlation_order
                .insert(seq, correlation.correlation_id.clone());
            tables
                .correlations
                .insert(correlation.correlation_id.clone(), correlation);
            seq
        } else {
            tables.correlations[&instance.correlation_id].sequence
        };

        instance.sequence = tables.allocate_sequence();
        tables
            .instance_order
            .insert(instance.sequence, instance.process_instance_id.clone());
        tables.index_instance(&instance, correlation_seq);
        tables
            .instances
            .insert(instance.process_instance_id.clone(), instance.clone());

        Ok(EntryInsert {
            correlation_created,
            instance,
        })
    }

    async fn update_process_instance_state(
        &self,
        process_instance_id: &str,
        expected_version: i64,
        termination: Termination,
        finished_at: &str,
    ) -> Result<ProcessInstanceRecord, StoreError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let record = tables
            .instances
            .get_mut(process_instance_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: RecordKind::ProcessInstance,
                key: process_instance_id.to_string(),
            })?;
        if record.version != expected_version {
            return Err(StoreError::ConcurrentConflict {
                key: process_instance_id.to_string(),
                expected_version,
            });
        }

        let from = record.state;
        let to = termination.state();
        record.state = to;
        record.error = match termination {
            Termination::Finished => None,
            Termination::Error(payload) => Some(payload),
        };
        record.finished_at = Some(finished_at.to_string());
        record.version += 1;
        let updated = record.clone();

        let seq = updated.sequence;
        let correlation_id = updated.correlation_id.clone();
        index_remove(&mut tables.by_state, &from, seq);
        index_insert(&mut tables.by_state, to, seq);
        index_remove(
            &mut tables.by_correlation_state,
            &(correlation_id.clone(), from),
            seq,
        );
        index_insert(&mut tables.by_correlation_state, (correlation_id, to), seq);

        Ok(updated)
    }

    async fn purge_process_model(
        &self,
        process_model_id: &str,
    ) -> Result<PurgeSummary, StoreError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let mut summary = PurgeSummary::default();

        let candidates = index_members(
            &tables.correlations_by_model,
            &process_model_id.to_string(),
        );
        for correlation_seq in candidates {
            let Some(correlation_id) = tables.correlation_order.get(&correlation_seq).cloned()
            else {
                continue;
            };
            let members = index_members(&tables.by_correlation, &correlation_id);
            let exclusive = members.iter().all(|seq| {
                tables
                    .instance_at(*seq)
                    .map_or(true, |inst| inst.process_model_id == process_model_id)
            });
            if !exclusive {
                continue;
            }

            for seq in members {
                if let Some(removed) = tables.remove_instance(seq) {
                    index_remove(
                        &mut tables.correlations_by_model,
                        &removed.process_model_id,
                        correlation_seq,
                    );
                    summary.process_instance_ids.push(removed.process_instance_id);
                }
            }
            if tables.remove_correlation(correlation_seq).is_some() {
                summary.correlation_ids.push(correlation_id);
            }
        }

        Ok(summary)
    }

    async fn get_correlation(&self, correlation_id: &str) -> Result<CorrelationRecord, StoreError> {
        self.tables
            .read()
            .await
            .correlations
            .get(correlation_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: RecordKind::Correlation,
                key: correlation_id.to_string(),
            })
    }

    async fn get_process_instance(
        &self,
        process_instance_id: &str,
    ) -> Result<ProcessInstanceRecord, StoreError> {
        self.tables
            .read()
            .await
            .instances
            .get(process_instance_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: RecordKind::ProcessInstance,
                key: process_instance_id.to_string(),
            })
    }

    async fn correlation_members(
        &self,
        correlation_id: &str,
    ) -> Result<CorrelationMembers, StoreError> {
        let tables = self.tables.read().await;
        if !tables.correlations.contains_key(correlation_id) {
            return Err(StoreError::NotFound {
                kind: RecordKind::Correlation,
                key: correlation_id.to_string(),
            });
        }
        let process_instances = index_members(&tables.by_correlation, &correlation_id.to_string())
            .into_iter()
            .filter_map(|seq| tables.instance_at(seq))
            .cloned()
            .collect();
        Ok(CorrelationMembers {
            state: CorrelationState::from_counts(
                tables.count(correlation_id, InstanceState::Running),
                tables.count(correlation_id, InstanceState::Error),
            ),
            process_instances,
        })
    }

    async fn scan_correlations(
        &self,
        query: &CorrelationQuery,
        predicate: RecordPredicate<'_, CorrelationRecord>,
        window: ScanWindow,
    ) -> Result<Vec<CorrelationRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .correlation_candidates(query)
            .into_iter()
            .filter_map(|seq| tables.correlation_at(seq))
            .filter(|record| predicate(*record))
            .skip(window.offset)
            .take(window.limit)
            .cloned()
            .collect())
    }

    async fn scan_process_instances(
        &self,
        query: &InstanceQuery,
        predicate: RecordPredicate<'_, ProcessInstanceRecord>,
        window: ScanWindow,
    ) -> Result<Vec<ProcessInstanceRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .instance_candidates(query)
            .into_iter()
            .filter_map(|seq| tables.instance_at(seq))
            .filter(|record| predicate(*record))
            .skip(window.offset)
            .take(window.limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Identity;

    fn correlation(id: &str) -> CorrelationRecord {
        CorrelationRecord {
            correlation_id: id.to_string(),
            owner: Identity::new("alice", "token-alice"),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            sequence: 0,
        }
    }

    fn instance(id: &str, correlation_id: &str, model: &str, parent: Option<&str>) -> ProcessInstanceRecord {
        ProcessInstanceRecord {
            process_instance_id: id.to_string(),
            correlation_id: correlation_id.to_string(),
            process_model_id: model.to_string(),
            process_model_hash: format!("{model}-hash"),
            parent_process_instance_id: parent.map(str::to_string),
            state: InstanceState::Running,
            error: None,
            owner: Identity::new("alice", "token-alice"),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: None,
            version: 0,
            sequence: 0,
        }
    }

    fn any(_: &CorrelationRecord) -> bool {
        true
    }

    async fn insert(store: &InMemoryStore, id: &str, corr: &str, model: &str, parent: Option<&str>) {
        store
            .insert_entry(correlation(corr), instance(id, corr, model, parent), &any)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sequences_are_shared_and_increasing() {
        let store = InMemoryStore::new();
        let first = store
            .insert_entry(correlation("c1"), instance("p1", "c1", "m1", None), &any)
            .await
            .unwrap();
        let second = store
            .insert_entry(correlation("c1"), instance("p2", "c1", "m1", None), &any)
            .await
            .unwrap();
        assert!(first.correlation_created);
        assert!(!second.correlation_created);
        assert!(second.instance.sequence > first.instance.sequence);
        let c1 = store.get_correlation("c1").await.unwrap();
        assert!(c1.sequence < first.instance.sequence);
    }

    #[tokio::test]
    async fn mismatched_correlation_record_is_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .insert_entry(correlation("c2"), instance("p1", "c1", "m1", None), &any)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.correlation_count().await, 0);
    }

    #[tokio::test]
    async fn rejected_join_writes_nothing() {
        let store = InMemoryStore::new();
        insert(&store, "p1", "c1", "m1", None).await;
        let err = store
            .insert_entry(correlation("c1"), instance("p2", "c1", "m1", None), &|_: &CorrelationRecord| false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JoinRejected { ref key } if key == "c1"));
        assert_eq!(store.process_instance_count().await, 1);

        let tables = store.tables.read().await;
        assert_eq!(tables.count("c1", InstanceState::Running), 1);
        assert_eq!(tables.by_model["m1"].len(), 1);
    }

    #[tokio::test]
    async fn join_guard_is_skipped_for_new_correlations() {
        let store = InMemoryStore::new();
        let inserted = store
            .insert_entry(correlation("c1"), instance("p1", "c1", "m1", None), &|_: &CorrelationRecord| false)
            .await
            .unwrap();
        assert!(inserted.correlation_created);
    }

    #[tokio::test]
    async fn members_are_read_with_their_state() {
        let store = InMemoryStore::new();
        insert(&store, "p1", "c1", "m1", None).await;
        insert(&store, "p2", "c2", "m1", None).await;
        insert(&store, "p3", "c1", "m2", Some("p1")).await;
        store
            .update_process_instance_state("p1", 0, Termination::Finished, "2026-01-01T00:01:00Z")
            .await
            .unwrap();

        let members = store.correlation_members("c1").await.unwrap();
        assert_eq!(members.state, CorrelationState::Active);
        let ids: Vec<_> = members
            .process_instances
            .iter()
            .map(|r| r.process_instance_id.as_str())
            .collect();
        assert_eq!(ids, ["p1", "p3"]);
        assert_eq!(members.process_instances[0].state, InstanceState::Finished);
    }

    #[tokio::test]
    async fn transition_moves_state_indexes() {
        let store = InMemoryStore::new();
        insert(&store, "p1", "c1", "m1", None).await;
        store
            .update_process_instance_state("p1", 0, Termination::Finished, "2026-01-01T00:01:00Z")
            .await
            .unwrap();

        let tables = store.tables.read().await;
        assert_eq!(tables.count("c1", InstanceState::Running), 0);
        assert_eq!(tables.count("c1", InstanceState::Finished), 1);
        assert!(!tables.by_state.contains_key(&InstanceState::Running));
    }

    #[tokio::test]
    async fn purge_leaves_no_index_residue() {
        let store = InMemoryStore::new();
        insert(&store, "p1", "c1", "m1", None).await;
        insert(&store, "p2", "c1", "m1", Some("p1")).await;
        store.purge_process_model("m1").await.unwrap();

        let tables = store.tables.read().await;
        assert!(tables.correlations.is_empty());
        assert!(tables.instances.is_empty());
        assert!(tables.by_correlation.is_empty());
        assert!(tables.by_model.is_empty());
        assert!(tables.by_state.is_empty());
        assert!(tables.by_parent.is_empty());
        assert!(tables.by_correlation_state.is_empty());
        assert!(tables.correlations_by_model.is_empty());
    }

    #[tokio::test]
    async fn purge_keeps_mixed_model_correlations() {
        let store = InMemoryStore::new();
        insert(&store, "p1", "c1", "m1", None).await;
        insert(&store, "p2", "c1", "m2", None).await;
        insert(&store, "p3", "c2", "m1", None).await;

        let summary = store.purge_process_model("m1").await.unwrap();
        assert_eq!(summary.correlation_ids, vec!["c2".to_string()]);
        assert_eq!(summary.process_instance_ids, vec!["p3".to_string()]);
        assert!(store.get_process_instance("p1").await.is_ok());
        assert_eq!(store.correlation_count().await, 1);
    }
}
