//! Read queries over correlations and process instances.
//!
//! Every list query hands the authorization filter to the store as a scan
//! predicate, so invisible records never occupy a page slot. Results come
//! back in creation order; with stable data, `offset = k, limit = m` is
//! exactly the slice `[k, k + m)` of the unpaged result.
//!
//! A correlation purged between the scan and the read of its members is
//! dropped from a list result; a single-correlation read reports it as
//! `NotFound`.

use std::sync::Arc;
use std::time::Duration;

use correlation_storage::{
    CorrelationQuery, CorrelationRecord, CorrelationState, CorrelationStore, Identity,
    InstanceQuery, InstanceState, ProcessInstanceRecord, RecordKind, StoreError,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::authz::AuthorizationFilter;
use crate::config::QueryLimits;
use crate::deadline::bounded;
use crate::error::{require_id, CorrelationError};

/// Paging options shared by all list queries.
///
/// `offset` defaults to 0. `limit` defaults to 0, which means the configured
/// default page size; any larger value is capped at the configured maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub offset: usize,
    pub limit: usize,
}

impl QueryOptions {
    pub fn new(offset: usize, limit: usize) -> Self {
        QueryOptions { offset, limit }
    }
}

/// A correlation together with its derived state and visible instances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub correlation_id: String,
    pub state: CorrelationState,
    pub created_at: String,
    pub process_instances: Vec<ProcessInstanceRecord>,
}

pub struct QueryEngine<S: CorrelationStore> {
    store: Arc<S>,
    authz: Arc<dyn AuthorizationFilter>,
    limits: QueryLimits,
    store_timeout: Duration,
}

impl<S: CorrelationStore> Clone for QueryEngine<S> {
    fn clone(&self) -> Self {
        QueryEngine {
            store: Arc::clone(&self.store),
            authz: Arc::clone(&self.authz),
            limits: self.limits,
            store_timeout: self.store_timeout,
        }
    }
}

impl<S: CorrelationStore> QueryEngine<S> {
    pub fn new(
        store: Arc<S>,
        authz: Arc<dyn AuthorizationFilter>,
        limits: QueryLimits,
        store_timeout: Duration,
    ) -> Self {
        QueryEngine {
            store,
            authz,
            limits,
            store_timeout,
        }
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    // ── Correlations ─────────────────────────────────────────────────────────

    pub async fn get_all(
        &self,
        identity: &Identity,
        options: QueryOptions,
    ) -> Result<Vec<Correlation>, CorrelationError> {
        self.correlations(identity, CorrelationQuery::All, options)
            .await
    }

    /// Correlations with at least one running process instance.
    pub async fn get_active(
        &self,
        identity: &Identity,
        options: QueryOptions,
    ) -> Result<Vec<Correlation>, CorrelationError> {
        self.correlations(identity, CorrelationQuery::Active, options)
            .await
    }

    pub async fn get_by_correlation_id(
        &self,
        identity: &Identity,
        correlation_id: &str,
    ) -> Result<Correlation, CorrelationError> {
        require_id("correlation_id", correlation_id)?;
        let record = match bounded(
            self.store_timeout,
            "get_correlation",
            self.store.get_correlation(correlation_id),
        )
        .await
        {
            Ok(record) if self.authz.can_read_correlation(identity, &record) => record,
            Ok(_) | Err(StoreError::NotFound { .. }) => {
                return Err(CorrelationError::not_found(
                    RecordKind::Correlation,
                    correlation_id,
                ))
            }
            Err(e) => return Err(CorrelationError::from_store("get_by_correlation_id", e)),
        };
        self.assemble(identity, record).await
    }

    /// Correlations containing at least one instance of `process_model_id`.
    pub async fn get_by_process_model_id(
        &self,
        identity: &Identity,
        process_model_id: &str,
        options: QueryOptions,
    ) -> Result<Vec<Correlation>, CorrelationError> {
        require_id("process_model_id", process_model_id)?;
        self.correlations(
            identity,
            CorrelationQuery::ByProcessModel(process_model_id.to_string()),
            options,
        )
        .await
    }

    // ── Process instances ────────────────────────────────────────────────────

    pub async fn get_by_process_instance_id(
        &self,
        identity: &Identity,
        process_instance_id: &str,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        require_id("process_instance_id", process_instance_id)?;
        self.visible_instance(identity, process_instance_id).await
    }

    /// Direct children of `process_instance_id`. Grandchildren are not included.
    ///
    /// `NotFound` if the parent is absent or invisible; empty if it has no
    /// (visible) children.
    pub async fn get_subprocesses_for_process_instance(
        &self,
        identity: &Identity,
        process_instance_id: &str,
        options: QueryOptions,
    ) -> Result<Vec<ProcessInstanceRecord>, CorrelationError> {
        require_id("process_instance_id", process_instance_id)?;
        self.visible_instance(identity, process_instance_id).await?;
        self.instances(
            identity,
            InstanceQuery::ChildrenOf(process_instance_id.to_string()),
            options,
        )
        .await
    }

    /// Instances of one correlation. An unknown correlation yields an empty list.
    pub async fn get_process_instances_for_correlation(
        &self,
        identity: &Identity,
        correlation_id: &str,
        options: QueryOptions,
    ) -> Result<Vec<ProcessInstanceRecord>, CorrelationError> {
        require_id("correlation_id", correlation_id)?;
        self.instances(
            identity,
            InstanceQuery::ByCorrelation(correlation_id.to_string()),
            options,
        )
        .await
    }

    pub async fn get_process_instances_for_process_model(
        &self,
        identity: &Identity,
        process_model_id: &str,
        options: QueryOptions,
    ) -> Result<Vec<ProcessInstanceRecord>, CorrelationError> {
        require_id("process_model_id", process_model_id)?;
        self.instances(
            identity,
            InstanceQuery::ByProcessModel(process_model_id.to_string()),
            options,
        )
        .await
    }

    pub async fn get_process_instances_by_state(
        &self,
        identity: &Identity,
        state: InstanceState,
        options: QueryOptions,
    ) -> Result<Vec<ProcessInstanceRecord>, CorrelationError> {
        self.instances(identity, InstanceQuery::ByState(state), options)
            .await
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn correlations(
        &self,
        identity: &Identity,
        query: CorrelationQuery,
        options: QueryOptions,
    ) -> Result<Vec<Correlation>, CorrelationError> {
        let window = self.limits.window(options);
        let authz = &self.authz;
        let visible = |record: &CorrelationRecord| authz.can_read_correlation(identity, record);
        let records = bounded(
            self.store_timeout,
            "scan_correlations",
            self.store.scan_correlations(&query, &visible, window),
        )
        .await
        .map_err(|e| CorrelationError::from_store("scan_correlations", e))?;
        debug!(
            query = ?query,
            offset = window.offset,
            limit = window.limit,
            returned = records.len(),
            "correlation scan"
        );

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            match self.assemble(identity, record).await {
                Ok(view) => views.push(view),
                // Purged after the scan; a list has nothing to report for it.
                Err(CorrelationError::NotFound { id, .. }) => {
                    debug!(correlation_id = %id, "correlation vanished during scan");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }

    async fn instances(
        &self,
        identity: &Identity,
        query: InstanceQuery,
        options: QueryOptions,
    ) -> Result<Vec<ProcessInstanceRecord>, CorrelationError> {
        let window = self.limits.window(options);
        let authz = &self.authz;
        let visible =
            |record: &ProcessInstanceRecord| authz.can_read_process_instance(identity, record);
        let records = bounded(
            self.store_timeout,
            "scan_process_instances",
            self.store.scan_process_instances(&query, &visible, window),
        )
        .await
        .map_err(|e| CorrelationError::from_store("scan_process_instances", e))?;
        debug!(
            query = ?query,
            offset = window.offset,
            limit = window.limit,
            returned = records.len(),
            "process instance scan"
        );
        Ok(records)
    }

    /// Attach derived state and the caller-visible member instances.
    async fn assemble(
        &self,
        identity: &Identity,
        record: CorrelationRecord,
    ) -> Result<Correlation, CorrelationError> {
        let members = bounded(
            self.store_timeout,
            "correlation_members",
            self.store.correlation_members(&record.correlation_id),
        )
        .await
        .map_err(|e| CorrelationError::from_store("correlation_members", e))?;

        Ok(Correlation {
            correlation_id: record.correlation_id,
            state: members.state,
            created_at: record.created_at,
            process_instances: self
                .authz
                .filter_process_instances(identity, members.process_instances),
        })
    }

    async fn visible_instance(
        &self,
        identity: &Identity,
        process_instance_id: &str,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        match bounded(
            self.store_timeout,
            "get_process_instance",
            self.store.get_process_instance(process_instance_id),
        )
        .await
        {
            Ok(record) if self.authz.can_read_process_instance(identity, &record) => Ok(record),
            Ok(_) | Err(StoreError::NotFound { .. }) => Err(CorrelationError::not_found(
                RecordKind::ProcessInstance,
                process_instance_id,
            )),
            Err(e) => Err(CorrelationError::from_store("get_process_instance", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::AllowAll;
    use crate::registry::{NewEntry, Registry};
    use correlation_storage::{InMemoryStore, ScanWindow};

    fn engine() -> (Registry<InMemoryStore>, QueryEngine<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let authz: Arc<dyn AuthorizationFilter> = Arc::new(AllowAll);
        let timeout = Duration::from_secs(1);
        (
            Registry::new(Arc::clone(&store), Arc::clone(&authz), timeout),
            QueryEngine::new(store, authz, QueryLimits::default(), timeout),
        )
    }

    #[test]
    fn options_default_to_first_default_page() {
        let options = QueryOptions::default();
        assert_eq!(options, QueryOptions::new(0, 0));
        assert_eq!(
            QueryLimits::default().window(options),
            ScanWindow::new(0, crate::config::DEFAULT_LIMIT)
        );
    }

    #[tokio::test]
    async fn correlation_view_lists_members_in_creation_order() {
        let (registry, queries) = engine();
        let me = Identity::new("alice", "t");
        for pid in ["p1", "p2", "p3"] {
            registry
                .create_entry(&me, NewEntry::new("c1", pid, "m1", "h1"))
                .await
                .unwrap();
        }
        let view = queries.get_by_correlation_id(&me, "c1").await.unwrap();
        assert_eq!(view.state, CorrelationState::Active);
        let ids: Vec<&str> = view
            .process_instances
            .iter()
            .map(|p| p.process_instance_id.as_str())
            .collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn unknown_correlation_has_no_instances() {
        let (_, queries) = engine();
        let me = Identity::new("alice", "t");
        let found = queries
            .get_process_instances_for_correlation(&me, "nope", QueryOptions::default())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn subprocesses_of_missing_parent_is_not_found() {
        let (_, queries) = engine();
        let me = Identity::new("alice", "t");
        let err = queries
            .get_subprocesses_for_process_instance(&me, "ghost", QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
