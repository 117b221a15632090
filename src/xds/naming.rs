//! Deterministic resource names
//!
//! Every name a bundle emits is derived from the owning spec's name and
//! namespace so that RoutingSpecs never collide and names stay stable across
//! passes. Components are escaped before joining because Kubernetes names may
//! contain the `.` separator.

/// Prefix shared by every generated name
pub const NAME_PREFIX: &str = "routeforge";

const SEPARATOR: char = '.';

/// Derives resource names for a single RoutingSpec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamer {
    prefix: String,
}

impl ResourceNamer {
    pub fn for_spec(name: &str, namespace: &str) -> Self {
        let prefix = [NAME_PREFIX.to_string(), escape(name), escape(namespace)].join(".");
        Self { prefix }
    }

    pub fn route_configuration(&self) -> String {
        self.qualify("routeconfig")
    }

    pub fn virtual_host(&self) -> String {
        self.qualify("vhost")
    }

    /// Name shared by a cluster and its load assignment
    pub fn cluster(&self, local_name: &str) -> String {
        self.qualify(&escape(local_name))
    }

    fn qualify(&self, suffix: &str) -> String {
        format!("{}{}{}", self.prefix, SEPARATOR, suffix)
    }
}

/// Escape a single name component so it contains no separator.
pub fn escape(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            SEPARATOR => escaped.push_str("%2E"),
            other => escaped.push(other),
        }
    }
    escaped
}
