//! Authorization filter.
//!
//! Decides which records an identity may see and which mutations it may
//! perform. Decisions are pure functions of the identity and the record:
//! no I/O, no side effects, same answer for the same inputs.
//!
//! The query engine hands the read checks to the store as scan predicates,
//! so invisible records are dropped before offset/limit are applied.

use correlation_storage::{CorrelationRecord, Identity, ProcessInstanceRecord};

use crate::config::AuthorizationConfig;

pub trait AuthorizationFilter: Send + Sync {
    /// May the identity create process instances at all?
    fn can_create_entry(&self, identity: &Identity) -> bool;

    fn can_read_correlation(&self, identity: &Identity, correlation: &CorrelationRecord) -> bool;

    fn can_read_process_instance(
        &self,
        identity: &Identity,
        instance: &ProcessInstanceRecord,
    ) -> bool;

    /// May the identity move the instance to a terminal state?
    fn can_finish_process_instance(
        &self,
        identity: &Identity,
        instance: &ProcessInstanceRecord,
    ) -> bool;

    /// Checked once per purge, not per removed record.
    fn can_purge_process_model(&self, identity: &Identity, process_model_id: &str) -> bool;

    fn filter_process_instances(
        &self,
        identity: &Identity,
        records: Vec<ProcessInstanceRecord>,
    ) -> Vec<ProcessInstanceRecord> {
        records
            .into_iter()
            .filter(|r| self.can_read_process_instance(identity, r))
            .collect()
    }
}

/// Owner-or-claim policy.
///
/// - Reads: the record owner, or any holder of `read_all_claim`.
/// - Create: any identity with a subject.
/// - Finish: the instance owner, or any holder of `manage_claim`.
/// - Purge: holders of `purge_claim` only.
#[derive(Debug, Clone, Default)]
pub struct ClaimsAuthorizer {
    config: AuthorizationConfig,
}

impl ClaimsAuthorizer {
    pub fn new(config: AuthorizationConfig) -> Self {
        ClaimsAuthorizer { config }
    }

    fn owns(identity: &Identity, owner: &Identity) -> bool {
        !identity.is_anonymous() && identity.subject == owner.subject
    }
}

impl AuthorizationFilter for ClaimsAuthorizer {
    fn can_create_entry(&self, identity: &Identity) -> bool {
        !identity.is_anonymous()
    }

    fn can_read_correlation(&self, identity: &Identity, correlation: &CorrelationRecord) -> bool {
        identity.has_claim(&self.config.read_all_claim) || Self::owns(identity, &correlation.owner)
    }

    fn can_read_process_instance(
        &self,
        identity: &Identity,
        instance: &ProcessInstanceRecord,
    ) -> bool {
        identity.has_claim(&self.config.read_all_claim) || Self::owns(identity, &instance.owner)
    }

    fn can_finish_process_instance(
        &self,
        identity: &Identity,
        instance: &ProcessInstanceRecord,
    ) -> bool {
        identity.has_claim(&self.config.manage_claim) || Self::owns(identity, &instance.owner)
    }

    fn can_purge_process_model(&self, identity: &Identity, _process_model_id: &str) -> bool {
        identity.has_claim(&self.config.purge_claim)
    }
}

/// Permits everything. For embedding behind an external gate, and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationFilter for AllowAll {
    fn can_create_entry(&self, _identity: &Identity) -> bool {
        true
    }

    fn can_read_correlation(&self, _identity: &Identity, _correlation: &CorrelationRecord) -> bool {
        true
    }

    fn can_read_process_instance(
        &self,
        _identity: &Identity,
        _instance: &ProcessInstanceRecord,
    ) -> bool {
        true
    }

    fn can_finish_process_instance(
        &self,
        _identity: &Identity,
        _instance: &ProcessInstanceRecord,
    ) -> bool {
        true
    }

    fn can_purge_process_model(&self, _identity: &Identity, _process_model_id: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use correlation_storage::InstanceState;

    fn instance(owner: &str) -> ProcessInstanceRecord {
        ProcessInstanceRecord {
            process_instance_id: format!("p-{owner}"),
            correlation_id: "c1".to_string(),
            process_model_id: "m1".to_string(),
            process_model_hash: "h1".to_string(),
            parent_process_instance_id: None,
            state: InstanceState::Running,
            error: None,
            owner: Identity::new(owner, format!("token-{owner}")),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: None,
            version: 0,
            sequence: 1,
        }
    }

    #[test]
    fn owner_reads_own_records_only() {
        let authz = ClaimsAuthorizer::default();
        let alice = Identity::new("alice", "t1");
        assert!(authz.can_read_process_instance(&alice, &instance("alice")));
        assert!(!authz.can_read_process_instance(&alice, &instance("bob")));
    }

    #[test]
    fn read_all_claim_sees_everything() {
        let authz = ClaimsAuthorizer::default();
        let auditor = Identity::new("auditor", "t2").with_claim("correlation:read_all");
        assert!(authz.can_read_process_instance(&auditor, &instance("bob")));
        assert!(!authz.can_finish_process_instance(&auditor, &instance("bob")));
    }

    #[test]
    fn anonymous_identity_owns_nothing() {
        let authz = ClaimsAuthorizer::default();
        let anonymous = Identity::default();
        assert!(!authz.can_create_entry(&anonymous));
        assert!(!authz.can_read_process_instance(&anonymous, &instance("")));
    }

    #[test]
    fn purge_requires_claim() {
        let authz = ClaimsAuthorizer::new(AuthorizationConfig {
            purge_claim: "admin".to_string(),
            ..AuthorizationConfig::default()
        });
        assert!(!authz.can_purge_process_model(&Identity::new("alice", "t"), "m1"));
        assert!(authz.can_purge_process_model(&Identity::new("root", "t").with_claim("admin"), "m1"));
    }

    #[test]
    fn filter_keeps_visible_records_in_order() {
        let authz = ClaimsAuthorizer::default();
        let alice = Identity::new("alice", "t1");
        let mut second = instance("alice");
        second.process_instance_id = "p-alice-2".to_string();
        let kept = authz.filter_process_instances(
            &alice,
            vec![instance("alice"), instance("bob"), second],
        );
        let ids: Vec<&str> = kept.iter().map(|r| r.process_instance_id.as_str()).collect();
        assert_eq!(ids, ["p-alice", "p-alice-2"]);
    }
}
