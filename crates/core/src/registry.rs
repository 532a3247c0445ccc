//! Correlation/instance registry.
//!
//! The only write path into the store. Every mutation follows the same order:
//! 1. Argument validation
//! 2. Authorization check
//! 3. Invariant check against the current record
//! 4. One atomic store write
//!
//! Process instance lifecycle:
//!
//! ```text
//!   running ──finish──▶ finished
//!      │
//!      └────fail──────▶ error
//! ```
//!
//! Terminal states are final. Any transition out of them is
//! `CorrelationError::InvalidTransition`.

use std::sync::Arc;
use std::time::Duration;

use correlation_storage::{
    CorrelationRecord, CorrelationStore, Identity, InstanceState, ProcessInstanceRecord,
    PurgeSummary, RecordKind, StoreError, Termination,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::authz::AuthorizationFilter;
use crate::deadline::{bounded, now_rfc3339};
use crate::error::{require_id, CorrelationError};

/// Arguments for [`Registry::create_entry`].
///
/// `parent_process_instance_id` defaults to `None`; set it when the instance
/// is started as a subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEntry {
    pub correlation_id: String,
    pub process_instance_id: String,
    pub process_model_id: String,
    pub process_model_hash: String,
    #[serde(default)]
    pub parent_process_instance_id: Option<String>,
}

impl NewEntry {
    pub fn new(
        correlation_id: impl Into<String>,
        process_instance_id: impl Into<String>,
        process_model_id: impl Into<String>,
        process_model_hash: impl Into<String>,
    ) -> Self {
        NewEntry {
            correlation_id: correlation_id.into(),
            process_instance_id: process_instance_id.into(),
            process_model_id: process_model_id.into(),
            process_model_hash: process_model_hash.into(),
            parent_process_instance_id: None,
        }
    }

    pub fn with_parent(mut self, parent_process_instance_id: impl Into<String>) -> Self {
        self.parent_process_instance_id = Some(parent_process_instance_id.into());
        self
    }

    fn validate(&self) -> Result<(), CorrelationError> {
        require_id("correlation_id", &self.correlation_id)?;
        require_id("process_instance_id", &self.process_instance_id)?;
        require_id("process_model_id", &self.process_model_id)?;
        require_id("process_model_hash", &self.process_model_hash)?;
        if let Some(parent) = &self.parent_process_instance_id {
            require_id("parent_process_instance_id", parent)?;
            if parent == &self.process_instance_id {
                return Err(CorrelationError::InvalidReference { id: parent.clone() });
            }
        }
        Ok(())
    }
}

pub struct Registry<S: CorrelationStore> {
    store: Arc<S>,
    authz: Arc<dyn AuthorizationFilter>,
    store_timeout: Duration,
}

impl<S: CorrelationStore> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Registry {
            store: Arc::clone(&self.store),
            authz: Arc::clone(&self.authz),
            store_timeout: self.store_timeout,
        }
    }
}

impl<S: CorrelationStore> Registry<S> {
    pub fn new(store: Arc<S>, authz: Arc<dyn AuthorizationFilter>, store_timeout: Duration) -> Self {
        Registry {
            store,
            authz,
            store_timeout,
        }
    }

    /// Create a running process instance, creating its correlation if unseen.
    ///
    /// Fails with:
    /// - `Forbidden` if the identity may not create entries, or the
    ///   correlation exists and is invisible to it at the moment of insert
    /// - `InvalidReference` if the parent does not resolve (or is invisible)
    /// - `DuplicateKey` if the process instance id is taken
    pub async fn create_entry(
        &self,
        identity: &Identity,
        entry: NewEntry,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        entry.validate()?;
        if !self.authz.can_create_entry(identity) {
            return Err(CorrelationError::forbidden(
                "create",
                RecordKind::ProcessInstance,
                &entry.process_instance_id,
            ));
        }

        if let Some(parent_id) = &entry.parent_process_instance_id {
            match bounded(
                self.store_timeout,
                "get_process_instance",
                self.store.get_process_instance(parent_id),
            )
            .await
            {
                Ok(parent) if self.authz.can_read_process_instance(identity, &parent) => {}
                Ok(_) | Err(StoreError::NotFound { .. }) => {
                    return Err(CorrelationError::InvalidReference {
                        id: parent_id.clone(),
                    })
                }
                Err(e) => return Err(CorrelationError::from_store("create_entry", e)),
            }
        }

        let now = now_rfc3339();
        let correlation = CorrelationRecord {
            correlation_id: entry.correlation_id.clone(),
            owner: identity.clone(),
            created_at: now.clone(),
            sequence: 0,
        };
        let instance = ProcessInstanceRecord {
            process_instance_id: entry.process_instance_id,
            correlation_id: entry.correlation_id,
            process_model_id: entry.process_model_id,
            process_model_hash: entry.process_model_hash,
            parent_process_instance_id: entry.parent_process_instance_id,
            state: InstanceState::Running,
            error: None,
            owner: identity.clone(),
            created_at: now,
            finished_at: None,
            version: 0,
            sequence: 0,
        };

        // Joining an existing correlation needs read access to it. The store
        // checks this under the same lock as the insert.
        let authz = &self.authz;
        let may_join =
            |existing: &CorrelationRecord| authz.can_read_correlation(identity, existing);
        let outcome = bounded(
            self.store_timeout,
            "insert_entry",
            self.store.insert_entry(correlation, instance, &may_join),
        )
        .await
        .map_err(|e| CorrelationError::from_store("create_entry", e))?;

        info!(
            correlation_id = %outcome.instance.correlation_id,
            process_instance_id = %outcome.instance.process_instance_id,
            process_model_id = %outcome.instance.process_model_id,
            parent = ?outcome.instance.parent_process_instance_id,
            correlation_created = outcome.correlation_created,
            "process instance created"
        );
        Ok(outcome.instance)
    }

    /// Move a running instance to `finished`.
    pub async fn finish_process_instance(
        &self,
        identity: &Identity,
        correlation_id: &str,
        process_instance_id: &str,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        self.terminate(
            identity,
            correlation_id,
            process_instance_id,
            Termination::Finished,
        )
        .await
    }

    /// Move a running instance to `error`, storing the payload uninterpreted.
    pub async fn finish_process_instance_with_error(
        &self,
        identity: &Identity,
        correlation_id: &str,
        process_instance_id: &str,
        error: serde_json::Value,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        self.terminate(
            identity,
            correlation_id,
            process_instance_id,
            Termination::Error(error),
        )
        .await
    }

    async fn terminate(
        &self,
        identity: &Identity,
        correlation_id: &str,
        process_instance_id: &str,
        termination: Termination,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        require_id("correlation_id", correlation_id)?;
        require_id("process_instance_id", process_instance_id)?;

        let current = self.load_instance(process_instance_id).await?;
        // An instance addressed through the wrong correlation does not exist
        // as far as the caller is concerned.
        if current.correlation_id != correlation_id {
            return Err(CorrelationError::not_found(
                RecordKind::ProcessInstance,
                process_instance_id,
            ));
        }
        if !self.authz.can_finish_process_instance(identity, &current) {
            return Err(CorrelationError::forbidden(
                "finish",
                RecordKind::ProcessInstance,
                process_instance_id,
            ));
        }
        if current.state.is_terminal() {
            return Err(CorrelationError::InvalidTransition {
                process_instance_id: process_instance_id.to_string(),
                state: current.state,
            });
        }

        let target = termination.state();
        let finished_at = now_rfc3339();
        let result = bounded(
            self.store_timeout,
            "update_process_instance_state",
            self.store.update_process_instance_state(
                process_instance_id,
                current.version,
                termination,
                &finished_at,
            ),
        )
        .await;

        match result {
            Ok(updated) => {
                info!(
                    correlation_id,
                    process_instance_id,
                    state = %updated.state,
                    "process instance finished"
                );
                Ok(updated)
            }
            Err(StoreError::ConcurrentConflict { .. }) => {
                warn!(
                    process_instance_id,
                    target = %target,
                    "lost finish race, re-reading instance"
                );
                let winner = self.load_instance(process_instance_id).await?;
                Err(CorrelationError::InvalidTransition {
                    process_instance_id: process_instance_id.to_string(),
                    state: winner.state,
                })
            }
            Err(e) => Err(CorrelationError::from_store("finish_process_instance", e)),
        }
    }

    /// Remove every correlation made up solely of instances of
    /// `process_model_id`, together with those instances.
    ///
    /// All-or-nothing. Authorization is checked once for the whole purge.
    /// Subprocesses living in other correlations keep their parent id.
    pub async fn delete_correlation_by_process_model_id(
        &self,
        identity: &Identity,
        process_model_id: &str,
    ) -> Result<PurgeSummary, CorrelationError> {
        require_id("process_model_id", process_model_id)?;
        if !self.authz.can_purge_process_model(identity, process_model_id) {
            return Err(CorrelationError::Forbidden {
                action: "purge".to_string(),
                kind: RecordKind::Correlation,
                id: format!("process model {process_model_id}"),
            });
        }

        let summary = bounded(
            self.store_timeout,
            "purge_process_model",
            self.store.purge_process_model(process_model_id),
        )
        .await
        .map_err(|e| CorrelationError::from_store("delete_correlation_by_process_model_id", e))?;

        if summary.is_empty() {
            debug!(process_model_id, "purge removed nothing");
        } else {
            info!(
                process_model_id,
                correlations = summary.correlation_ids.len(),
                process_instances = summary.process_instance_ids.len(),
                "purged correlations"
            );
        }
        Ok(summary)
    }

    async fn load_instance(
        &self,
        process_instance_id: &str,
    ) -> Result<ProcessInstanceRecord, CorrelationError> {
        bounded(
            self.store_timeout,
            "get_process_instance",
            self.store.get_process_instance(process_instance_id),
        )
        .await
        .map_err(|e| CorrelationError::from_store("get_process_instance", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::AllowAll;
    use correlation_storage::InMemoryStore;

    fn registry() -> Registry<InMemoryStore> {
        Registry::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(AllowAll),
            Duration::from_secs(1),
        )
    }

    fn alice() -> Identity {
        Identity::new("alice", "token-alice")
    }

    #[test]
    fn self_parent_is_invalid_reference() {
        let entry = NewEntry::new("c1", "p1", "m1", "h1").with_parent("p1");
        assert!(matches!(
            entry.validate(),
            Err(CorrelationError::InvalidReference { .. })
        ));
    }

    #[test]
    fn missing_parent_field_deserializes_as_none() {
        let entry: NewEntry = serde_json::from_value(serde_json::json!({
            "correlation_id": "c1",
            "process_instance_id": "p1",
            "process_model_id": "m1",
            "process_model_hash": "h1",
        }))
        .unwrap();
        assert_eq!(entry, NewEntry::new("c1", "p1", "m1", "h1"));
    }

    #[tokio::test]
    async fn empty_identifier_is_invalid_argument() {
        let err = registry()
            .create_entry(&alice(), NewEntry::new("", "p1", "m1", "h1"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, CorrelationError::InvalidArgument { ref field, .. } if field == "correlation_id")
        );
    }

    #[tokio::test]
    async fn finish_stamps_finished_at_and_version() {
        let registry = registry();
        registry
            .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
            .await
            .unwrap();
        let finished = registry
            .finish_process_instance(&alice(), "c1", "p1")
            .await
            .unwrap();
        assert_eq!(finished.state, InstanceState::Finished);
        assert_eq!(finished.version, 1);
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn wrong_correlation_reads_as_not_found() {
        let registry = registry();
        registry
            .create_entry(&alice(), NewEntry::new("c1", "p1", "m1", "h1"))
            .await
            .unwrap();
        let err = registry
            .finish_process_instance(&alice(), "c2", "p1")
            .await
            .unwrap_err();
        assert!(matches!(err, CorrelationError::NotFound { .. }));
    }
}
