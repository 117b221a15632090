//! In-memory source for embedding and tests

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{MembershipSource, RoutingSpecSource};
use crate::domain::{Membership, NamespacedName, RoutingSpec};
use crate::errors::Result;

/// Mutable routing specs and membership, keyed by namespace and name.
#[derive(Debug, Default)]
pub struct InMemorySource {
    specs: RwLock<BTreeMap<NamespacedName, RoutingSpec>>,
    membership: RwLock<BTreeMap<NamespacedName, Membership>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a routing spec
    pub fn upsert_spec(&self, spec: RoutingSpec) {
        self.specs.write().insert(spec.key(), spec);
    }

    pub fn remove_spec(&self, key: &NamespacedName) -> Option<RoutingSpec> {
        self.specs.write().remove(key)
    }

    /// Insert or replace the membership of a service
    pub fn upsert_membership(&self, membership: Membership) {
        self.membership.write().insert(membership.key(), membership);
    }

    pub fn remove_membership(&self, key: &NamespacedName) -> Option<Membership> {
        self.membership.write().remove(key)
    }
}

#[async_trait]
impl RoutingSpecSource for InMemorySource {
    async fn list_routing_specs(&self) -> Result<Vec<RoutingSpec>> {
        Ok(self.specs.read().values().cloned().collect())
    }
}

#[async_trait]
impl MembershipSource for InMemorySource {
    async fn list_membership(&self) -> Result<Vec<Membership>> {
        Ok(self.membership.read().values().cloned().collect())
    }
}
