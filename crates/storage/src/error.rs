use std::fmt;

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Correlation,
    ProcessInstance,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Correlation => f.write_str("correlation"),
            RecordKind::ProcessInstance => f.write_str("process instance"),
        }
    }
}

/// All errors that can be returned by a CorrelationStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this primary key already exists.
    #[error("duplicate {kind} key: {key}")]
    DuplicateKey { kind: RecordKind, key: String },

    /// No record with the given primary key.
    #[error("{kind} not found: {key}")]
    NotFound { kind: RecordKind, key: String },

    /// A foreign reference (parent process instance) does not resolve.
    #[error("dangling {kind} reference: {key}")]
    DanglingReference { kind: RecordKind, key: String },

    /// The correlation already exists and the caller's join guard refused it.
    #[error("join rejected for existing correlation: {key}")]
    JoinRejected { key: String },

    /// Optimistic concurrency control conflict: the record was modified
    /// since it was read. The expected version was not found.
    #[error("concurrent conflict on process instance {key}: expected version {expected_version}")]
    ConcurrentConflict { key: String, expected_version: i64 },

    /// The store did not answer within the caller's deadline.
    #[error("store operation {operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Transient failures may succeed when retried; all others are definitive.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout { .. } | StoreError::Backend(_))
    }
}
