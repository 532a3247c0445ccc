pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::{RecordKind, StoreError};
pub use memory::InMemoryStore;
pub use record::{
    CorrelationMembers, CorrelationQuery, CorrelationRecord, CorrelationState, EntryInsert, Identity, InstanceQuery,
    InstanceState, ProcessInstanceRecord, PurgeSummary, ScanWindow, Termination,
};
pub use traits::{CorrelationStore, RecordPredicate};
