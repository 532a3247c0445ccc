//! Correlation tracking -- groups process instances into correlations,
//! drives their running/finished/error lifecycle, and answers paged,
//! authorization-filtered queries over them.
//!
//! Writes go through [`Registry`], reads through [`QueryEngine`]. Both sit on
//! a shared [`CorrelationStore`] and consult an [`AuthorizationFilter`] on
//! every call.

pub mod authz;
pub mod config;
mod deadline;
pub mod error;
pub mod query;
pub mod registry;

use std::sync::Arc;

pub use authz::{AllowAll, AuthorizationFilter, ClaimsAuthorizer};
pub use config::{AuthorizationConfig, EngineConfig, QueryLimits, StoreConfig};
pub use correlation_storage::{
    CorrelationRecord, CorrelationState, CorrelationStore, Identity, InMemoryStore, InstanceState,
    ProcessInstanceRecord, PurgeSummary, RecordKind,
};
pub use error::{ConfigError, CorrelationError};
pub use query::{Correlation, QueryEngine, QueryOptions};
pub use registry::{NewEntry, Registry};

/// Registry and query engine wired to the same store and filter.
pub struct CorrelationEngine<S: CorrelationStore> {
    pub registry: Registry<S>,
    pub queries: QueryEngine<S>,
}

impl<S: CorrelationStore> Clone for CorrelationEngine<S> {
    fn clone(&self) -> Self {
        CorrelationEngine {
            registry: self.registry.clone(),
            queries: self.queries.clone(),
        }
    }
}

impl<S: CorrelationStore> CorrelationEngine<S> {
    pub fn new(store: Arc<S>, authz: Arc<dyn AuthorizationFilter>, config: &EngineConfig) -> Self {
        let timeout = config.store.timeout();
        CorrelationEngine {
            registry: Registry::new(Arc::clone(&store), Arc::clone(&authz), timeout),
            queries: QueryEngine::new(store, authz, config.query, timeout),
        }
    }
}
