use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The caller on whose behalf an operation runs.
///
/// Opaque to the registry and query engine: it is threaded through every call,
/// stored as the owner of the records it creates, and only interpreted by an
/// authorization filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    /// Bearer token the identity was resolved from. Never serialized.
    #[serde(default, skip_serializing)]
    pub token: String,
    #[serde(default)]
    pub claims: BTreeSet<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, token: impl Into<String>) -> Self {
        Identity {
            subject: subject.into(),
            token: token.into(),
            claims: BTreeSet::new(),
        }
    }

    /// Builder-style helper adding a claim.
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claims.insert(claim.into());
        self
    }

    pub fn has_claim(&self, claim: &str) -> bool {
        self.claims.contains(claim)
    }

    pub fn is_anonymous(&self) -> bool {
        self.subject.is_empty()
    }
}

/// Lifecycle state of a single process instance.
///
/// `Running` is the only non-terminal state; an instance leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Running,
    Finished,
    Error,
}

impl InstanceState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InstanceState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Running => "running",
            InstanceState::Finished => "finished",
            InstanceState::Error => "error",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the lowercase names used on the wire.
impl FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(InstanceState::Running),
            "finished" => Ok(InstanceState::Finished),
            "error" => Ok(InstanceState::Error),
            other => Err(format!(
                "unknown state {other:?}, expected one of running, finished, error"
            )),
        }
    }
}

/// Aggregate state of a correlation, derived from its process instances.
///
/// - `Active` if any instance is running
/// - `Error` if none is running and at least one ended in error
/// - `Finished` otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationState {
    Active,
    Finished,
    Error,
}

impl CorrelationState {
    /// Fold per-state instance counts into the aggregate state.
    pub fn from_counts(running: usize, errored: usize) -> Self {
        if running > 0 {
            CorrelationState::Active
        } else if errored > 0 {
            CorrelationState::Error
        } else {
            CorrelationState::Finished
        }
    }
}

/// A business transaction grouping one or more process instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub correlation_id: String,
    /// Identity whose entry created the correlation.
    pub owner: Identity,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    /// Store-assigned insertion order. Ignored on insert.
    pub sequence: u64,
}

/// A single run of a process model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceRecord {
    pub process_instance_id: String,
    pub correlation_id: String,
    pub process_model_id: String,
    pub process_model_hash: String,
    pub parent_process_instance_id: Option<String>,
    pub state: InstanceState,
    /// Opaque error payload, present iff `state == Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    pub owner: Identity,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    /// RFC 3339 timestamp string. None while running.
    pub finished_at: Option<String>,
    /// Optimistic concurrency counter: 0 on creation, +1 per transition.
    pub version: i64,
    /// Store-assigned insertion order. Ignored on insert.
    pub sequence: u64,
}

/// The terminal outcome written by a finish transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Finished,
    Error(serde_json::Value),
}

impl Termination {
    pub fn state(&self) -> InstanceState {
        match self {
            Termination::Finished => InstanceState::Finished,
            Termination::Error(_) => InstanceState::Error,
        }
    }
}

/// Outcome of a successful `insert_entry`.
#[derive(Debug, Clone)]
pub struct EntryInsert {
    /// True when the owning correlation did not exist and was created.
    pub correlation_created: bool,
    /// The stored instance, with its assigned sequence.
    pub instance: ProcessInstanceRecord,
}

/// Aggregate state and member instances of one correlation, read together.
#[derive(Debug, Clone)]
pub struct CorrelationMembers {
    pub state: CorrelationState,
    /// Members in sequence order.
    pub process_instances: Vec<ProcessInstanceRecord>,
}

/// Records removed by a process-model purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub correlation_ids: Vec<String>,
    pub process_instance_ids: Vec<String>,
}

impl PurgeSummary {
    pub fn is_empty(&self) -> bool {
        self.correlation_ids.is_empty()
    }
}

/// Index-backed candidate selection for correlation scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationQuery {
    All,
    /// Correlations with at least one running instance.
    Active,
    /// Correlations with at least one instance of the given model.
    ByProcessModel(String),
}

/// Index-backed candidate selection for process instance scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceQuery {
    All,
    ByCorrelation(String),
    ByProcessModel(String),
    ByState(InstanceState),
    /// Direct children of the given instance.
    ChildrenOf(String),
}

/// Offset/limit applied after predicate filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub offset: usize,
    pub limit: usize,
}

impl ScanWindow {
    pub fn new(offset: usize, limit: usize) -> Self {
        ScanWindow { offset, limit }
    }

    pub fn unbounded() -> Self {
        ScanWindow {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_state_parses_wire_names_only() {
        for state in [
            InstanceState::Running,
            InstanceState::Finished,
            InstanceState::Error,
        ] {
            assert_eq!(state.as_str().parse::<InstanceState>(), Ok(state));
        }
        assert!("Running".parse::<InstanceState>().is_err());
        let err = "bogus".parse::<InstanceState>().unwrap_err();
        assert!(err.contains("bogus"));
    }
}
