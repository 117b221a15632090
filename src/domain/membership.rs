//! Endpoint membership
//!
//! Live set of addresses and ports backing a service, grouped into subsets
//! the way Kubernetes `Endpoints` objects are. Membership is read-only to the
//! synthesis engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::id::NamespacedName;

fn default_namespace() -> String {
    "default".to_string()
}

/// Endpoints for one logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub subsets: Vec<Subset>,
}

impl Membership {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), subsets: Vec::new() }
    }

    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(&self.namespace, &self.name)
    }

    pub fn with_subset(mut self, subset: Subset) -> Self {
        self.subsets.push(subset);
        self
    }

    /// Total number of addresses across all subsets
    pub fn address_count(&self) -> usize {
        self.subsets.iter().map(|s| s.addresses.len()).sum()
    }
}

/// Addresses sharing the same set of ports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Subset {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub ports: Vec<MembershipPort>,
}

impl Subset {
    pub fn new<A, S>(addresses: A, ports: Vec<MembershipPort>) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { addresses: addresses.into_iter().map(Into::into).collect(), ports }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: u16,
}

impl MembershipPort {
    pub fn named(name: impl Into<String>, port: u16) -> Self {
        Self { name: Some(name.into()), port }
    }

    pub fn unnamed(port: u16) -> Self {
        Self { name: None, port }
    }
}

/// Membership lookup by namespace and service name, built once per pass.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    entries: HashMap<NamespacedName, Membership>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the membership for its key
    pub fn insert(&mut self, membership: Membership) {
        self.entries.insert(membership.key(), membership);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&Membership> {
        self.entries.get(&NamespacedName::new(namespace, name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Membership> for MembershipIndex {
    fn from_iter<I: IntoIterator<Item = Membership>>(iter: I) -> Self {
        let mut index = Self::new();
        for membership in iter {
            index.insert(membership);
        }
        index
    }
}
