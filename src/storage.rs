//! The Storage facade (§4.7): the PDP's only collaborator for persistence.
//!
//! Grounded on `octofhir_auth::storage::PolicyStorage` (`teacher_ref/storage/
//! policy.rs`) — an `async_trait` capability the engine depends on by
//! reference, never owns — but narrowed to the three operations §4.7
//! actually names. The teacher's trait sorts by priority; this crate's
//! Storage does not, since §9 explicitly retires priority in favor of
//! deny-override alone (see DESIGN.md).

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::PdpResult;
use crate::policy::{Policy, ResourceRecord, Subject};

/// The persistence capability the PDP consumes (§4.7).
///
/// Any backend (SQL-backed or in-memory) may implement this so long as it
/// preserves the Policy/Resource data model and the Subject interface.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Loads every known policy, enabled or not; the PDP filters disabled
    /// ones itself (§4.6 step 2). A storage error here is terminal
    /// (`StorageUnavailable`, §7).
    async fn get_policies(&self) -> PdpResult<Vec<Policy>>;

    /// Fetches a resource record by id. Per §4.6 step 4 this lookup "may
    /// fail"; implementations should return `Ok(None)` for not-found, but
    /// the PDP tolerates an `Err` here too by treating it the same as "not
    /// found" rather than surfacing it to the caller.
    async fn get_resource(&self, id: &str) -> PdpResult<Option<ResourceRecord>>;

    /// Builds a concrete [`Subject`] from a persistent user id. Used by the
    /// HTTP middleware (out of this crate's scope) before calling
    /// `evaluate`; the PDP itself never calls this, since a decision request
    /// already carries a resolved Subject (§6).
    async fn build_subject_from_user(&self, user_id: &str) -> PdpResult<Box<dyn Subject>>;
}

/// A reference, in-memory [`Storage`] implementation: the whole policy set
/// and resource table held in a `RwLock`-guarded map, suitable for tests,
/// examples, and small deployments that don't need a SQL backend.
#[derive(Default)]
pub struct InMemoryStorage {
    policies: RwLock<Vec<Policy>>,
    resources: RwLock<BTreeMap<String, ResourceRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            policies: RwLock::new(Vec::new()),
            resources: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_policies(policies: Vec<Policy>) -> Self {
        InMemoryStorage {
            policies: RwLock::new(policies),
            resources: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn add_policy(&self, policy: Policy) {
        self.policies.write().unwrap().push(policy);
    }

    pub fn put_resource(&self, resource: ResourceRecord) {
        self.resources.write().unwrap().insert(resource.id.clone(), resource);
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_policies(&self) -> PdpResult<Vec<Policy>> {
        Ok(self.policies.read().unwrap().clone())
    }

    async fn get_resource(&self, id: &str) -> PdpResult<Option<ResourceRecord>> {
        Ok(self.resources.read().unwrap().get(id).cloned())
    }

    async fn build_subject_from_user(&self, user_id: &str) -> PdpResult<Box<dyn Subject>> {
        Ok(Box::new(crate::policy::UserSubject::new(user_id, user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Effect, Statement, StringOrList};

    fn sample_policy() -> Policy {
        Policy {
            id: "p1".to_string(),
            policy_name: "allow-read".to_string(),
            description: None,
            version: "1".to_string(),
            enabled: true,
            statement: vec![Statement {
                sid: Some("S1".to_string()),
                effect: Effect::Allow,
                action: StringOrList::single("doc:file:read"),
                resource: StringOrList::single("api:doc:*"),
                not_resource: None,
                condition: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_in_memory_storage_round_trips_policies() {
        let storage = InMemoryStorage::new();
        storage.add_policy(sample_policy());
        let policies = storage.get_policies().await.unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].id, "p1");
    }

    #[tokio::test]
    async fn test_missing_resource_returns_none_not_error() {
        let storage = InMemoryStorage::new();
        let resource = storage.get_resource("missing").await.unwrap();
        assert!(resource.is_none());
    }

    #[tokio::test]
    async fn test_build_subject_from_user() {
        let storage = InMemoryStorage::new();
        let subject = storage.build_subject_from_user("user-1").await.unwrap();
        assert_eq!(subject.id(), "user-1");
    }
}
