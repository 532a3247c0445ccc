//! Application state shared across request handlers.

use std::collections::HashMap;

use correlation_core::{CorrelationEngine, Identity, InMemoryStore};

pub(crate) struct AppState {
    /// Registry and query engine over the process-wide store.
    pub(crate) engine: CorrelationEngine<InMemoryStore>,
    /// Bearer token -> identity.
    pub(crate) identities: HashMap<String, Identity>,
}

impl AppState {
    pub(crate) fn resolve(&self, token: &str) -> Option<&Identity> {
        self.identities.get(token)
    }
}
