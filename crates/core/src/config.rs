//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields a working configuration:
//!
//! ```toml
//! [query]
//! default_limit = 100
//! max_limit = 1000
//!
//! [store]
//! timeout_ms = 5000
//!
//! [authorization]
//! read_all_claim = "correlation:read_all"
//! manage_claim = "correlation:manage"
//! purge_claim = "correlation:purge"
//! ```

use std::time::Duration;

use correlation_storage::ScanWindow;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::QueryOptions;

/// Default page size when the caller passes `limit = 0`.
pub const DEFAULT_LIMIT: usize = 100;
/// Hard upper bound on any page, whatever the caller asks for.
pub const MAX_LIMIT: usize = 1000;
/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub query: QueryLimits,
    pub store: StoreConfig,
    pub authorization: AuthorizationConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.query.validate()?;
        if self.store.timeout_ms == 0 {
            return Err(ConfigError("store.timeout_ms must be positive".to_string()));
        }
        self.authorization.validate()
    }
}

/// Server-side paging bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Page size used when the caller passes `limit = 0`.
    pub default_limit: usize,
    /// Upper bound applied to every requested limit.
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl QueryLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError("query.max_limit must be positive".to_string()));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError(format!(
                "query.default_limit must be between 1 and max_limit ({}), got {}",
                self.max_limit, self.default_limit
            )));
        }
        Ok(())
    }

    /// Effective page size: `0` means the default, anything else is capped.
    pub fn effective_limit(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_limit
        } else {
            requested.min(self.max_limit)
        }
    }

    pub fn window(&self, options: QueryOptions) -> ScanWindow {
        ScanWindow::new(options.offset, self.effective_limit(options.limit))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Deadline for a single store call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Claim names consulted by the claims-based authorization filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Holder sees every correlation and process instance.
    pub read_all_claim: String,
    /// Holder may finish any process instance.
    pub manage_claim: String,
    /// Holder may purge correlations by process model.
    pub purge_claim: String,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        AuthorizationConfig {
            read_all_claim: "correlation:read_all".to_string(),
            manage_claim: "correlation:manage".to_string(),
            purge_claim: "correlation:purge".to_string(),
        }
    }
}

impl AuthorizationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("read_all_claim", &self.read_all_claim),
            ("manage_claim", &self.manage_claim),
            ("purge_claim", &self.purge_claim),
        ] {
            if value.is_empty() {
                return Err(ConfigError(format!("authorization.{name} must not be empty")));
            }
        }
        Ok(())
    }
}
