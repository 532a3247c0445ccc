use correlation_storage::{InstanceState, RecordKind, StoreError};

/// Errors returned by the registry and the query engine.
///
/// Every variant names the identifier it concerns, so callers can tell
/// "nothing to show" (an empty list) apart from "you asked for something
/// invalid" (one of these).
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// The record does not exist, or exists but is invisible to the caller.
    /// The two cases are indistinguishable to the caller.
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    /// The caller knows the record exists but lacks the right to act on it.
    #[error("not permitted to {action} {kind} {id}")]
    Forbidden {
        action: String,
        kind: RecordKind,
        id: String,
    },

    /// A process instance with this id already exists.
    #[error("process instance already exists: {id}")]
    DuplicateKey { id: String },

    /// The parent process instance does not resolve.
    #[error("parent process instance does not exist: {id}")]
    InvalidReference { id: String },

    /// The instance already left the running state.
    #[error("process instance {process_instance_id} is already {state}")]
    InvalidTransition {
        process_instance_id: String,
        state: InstanceState,
    },

    /// A required argument was empty or malformed.
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// The store timed out or failed. Safe to retry.
    #[error("store unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },
}

impl CorrelationError {
    /// Transient failures may succeed when retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CorrelationError::Unavailable { .. })
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CorrelationError::NotFound { .. } => "not_found",
            CorrelationError::Forbidden { .. } => "forbidden",
            CorrelationError::DuplicateKey { .. } => "duplicate_key",
            CorrelationError::InvalidReference { .. } => "invalid_reference",
            CorrelationError::InvalidTransition { .. } => "invalid_transition",
            CorrelationError::InvalidArgument { .. } => "invalid_argument",
            CorrelationError::Unavailable { .. } => "unavailable",
        }
    }

    pub(crate) fn not_found(kind: RecordKind, id: &str) -> Self {
        CorrelationError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn forbidden(action: &str, kind: RecordKind, id: &str) -> Self {
        CorrelationError::Forbidden {
            action: action.to_string(),
            kind,
            id: id.to_string(),
        }
    }

    /// Map a store failure that has no operation-specific meaning.
    pub(crate) fn from_store(operation: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => CorrelationError::NotFound { kind, id: key },
            StoreError::DuplicateKey { key, .. } => CorrelationError::DuplicateKey { id: key },
            StoreError::DanglingReference { key, .. } => {
                CorrelationError::InvalidReference { id: key }
            }
            StoreError::JoinRejected { key } => {
                CorrelationError::forbidden("join", RecordKind::Correlation, &key)
            }
            other => CorrelationError::Unavailable {
                operation: operation.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Reject empty identifiers before they reach the store. Any other string,
/// whitespace included, is a valid identifier.
pub(crate) fn require_id(field: &str, value: &str) -> Result<(), CorrelationError> {
    if value.is_empty() {
        return Err(CorrelationError::InvalidArgument {
            field: field.to_string(),
            reason: "must be a non-empty string".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        let timeout = CorrelationError::from_store(
            "get_correlation",
            StoreError::Timeout {
                operation: "get_correlation".to_string(),
                after_ms: 10,
            },
        );
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind(), "unavailable");

        let missing = CorrelationError::not_found(RecordKind::Correlation, "c1");
        assert!(!missing.is_retryable());
        assert_eq!(missing.to_string(), "correlation not found: c1");
    }

    #[test]
    fn dangling_reference_maps_to_invalid_reference() {
        let err = CorrelationError::from_store(
            "insert_entry",
            StoreError::DanglingReference {
                kind: RecordKind::ProcessInstance,
                key: "p0".to_string(),
            },
        );
        assert!(matches!(err, CorrelationError::InvalidReference { ref id } if id == "p0"));
    }

    #[test]
    fn rejected_join_maps_to_forbidden() {
        let err = CorrelationError::from_store(
            "create_entry",
            StoreError::JoinRejected {
                key: "c1".to_string(),
            },
        );
        assert!(matches!(
            err,
            CorrelationError::Forbidden { ref action, kind: RecordKind::Correlation, ref id }
                if action == "join" && id == "c1"
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_empty_identifiers_are_rejected() {
        assert!(require_id("correlation_id", "c1").is_ok());
        assert!(require_id("correlation_id", " ").is_ok());
        assert!(require_id("correlation_id", "\t").is_ok());
        let err = require_id("correlation_id", "").unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
