//! Per-spec resource bundles
//!
//! A [`ServiceBundle`] is everything a routing spec contributes to a snapshot:
//! its listener, route configuration, clusters and load assignments. Bundles
//! are rebuilt in full from the spec and the pass's membership and are never
//! mutated afterwards.

use std::collections::HashSet;

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use tracing::debug;

use crate::domain::{MembershipIndex, NamespacedName, RoutingSpec};
use crate::errors::{Error, Result};

use super::cluster::{build_cluster, build_load_assignment};
use super::endpoints::EndpointResolver;
use super::listener::build_listener;
use super::naming::ResourceNamer;
use super::resources::{
    BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};
use super::route::RouteTable;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBundle {
    pub key: NamespacedName,
    pub listener: Listener,
    pub route_table: RouteTable,
    pub route_configuration: RouteConfiguration,
    pub clusters: Vec<Cluster>,
    pub load_assignments: Vec<ClusterLoadAssignment>,
}

impl ServiceBundle {
    pub fn listener_name(&self) -> &str {
        &self.listener.name
    }

    /// Encoded resources of one type, in declaration order
    pub fn resources(&self, type_url: &str) -> Vec<BuiltResource> {
        match type_url {
            LISTENER_TYPE_URL => vec![BuiltResource::listener(&self.listener)],
            ROUTE_TYPE_URL => vec![BuiltResource::route_configuration(&self.route_configuration)],
            CLUSTER_TYPE_URL => self.clusters.iter().map(BuiltResource::cluster).collect(),
            ENDPOINT_TYPE_URL => {
                self.load_assignments.iter().map(BuiltResource::load_assignment).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn resource_names(&self, type_url: &str) -> Vec<String> {
        match type_url {
            LISTENER_TYPE_URL => vec![self.listener.name.clone()],
            ROUTE_TYPE_URL => vec![self.route_configuration.name.clone()],
            CLUSTER_TYPE_URL => self.clusters.iter().map(|c| c.name.clone()).collect(),
            ENDPOINT_TYPE_URL => {
                self.load_assignments.iter().map(|l| l.cluster_name.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn resource_count(&self) -> usize {
        2 + self.clusters.len() + self.load_assignments.len()
    }
}

/// Synthesize the full bundle for `spec`. Any failure fails the whole bundle.
pub fn synthesize_bundle(
    spec: &RoutingSpec,
    membership: &MembershipIndex,
) -> Result<ServiceBundle> {
    let key = spec.key();
    let namer = ResourceNamer::for_spec(&spec.name, &spec.namespace);

    let mut seen = HashSet::new();
    if let Some(duplicate) = spec.clusters.iter().find(|c| !seen.insert(c.name.as_str())) {
        return Err(Error::config(format!(
            "{} declares cluster {:?} more than once",
            key, duplicate.name
        )));
    }

    let route_table = RouteTable::compile(spec, &namer)?;
    let route_configuration = route_table.to_envoy();
    let listener = build_listener(spec, &route_configuration.name)?;

    let resolver = EndpointResolver::new(membership, &spec.namespace);
    let mut clusters = Vec::with_capacity(spec.clusters.len());
    let mut load_assignments = Vec::with_capacity(spec.clusters.len());
    for cluster_spec in &spec.clusters {
        let name = namer.cluster(&cluster_spec.name);
        load_assignments.push(build_load_assignment(&name, cluster_spec, &resolver)?);
        clusters.push(build_cluster(&name));
    }

    debug!(
        spec = %key,
        listener = %listener.name,
        routes = route_table.routes.len(),
        clusters = clusters.len(),
        "Synthesized service bundle"
    );

    Ok(ServiceBundle {
        key,
        listener,
        route_table,
        route_configuration,
        clusters,
        load_assignments,
    })
}
