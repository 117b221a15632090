//! Namespace-qualified identifiers
//!
//! Routing specs and membership objects are both addressed by namespace and
//! name. `NamespacedName` orders by namespace first so iteration over a
//! snapshot is deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace + name pair identifying a routing spec or a membership object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
