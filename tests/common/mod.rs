//! Common test utilities for all integration tests.
//!
//! Builders for routing specs and membership, helpers to decode the resources
//! of a published snapshot, and a seeded traffic simulator that picks clusters
//! and endpoints the way the proxy would from the encoded resources.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::{address, socket_address};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, Route, RouteConfiguration,
};
use prost::Message;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use routeforge::domain::{
    ClusterSpec, Locality, Membership, MembershipPort, PortRef, RouteSpec, RoutingSpec,
    ServiceRef, Subset,
};
use routeforge::xds::{Snapshot, ENDPOINT_TYPE_URL, ROUTE_TYPE_URL};
use routeforge::{InMemorySource, SnapshotAssembler, SnapshotStore};

pub const SEED: u64 = 0x5eed_f00d;

/// Routing spec with one catch-all route to a single cluster `v1` backed by
/// `service` on the `grpc` port.
pub fn simple_spec(namespace: &str, name: &str, listener: &str, service: &str) -> RoutingSpec {
    RoutingSpec::new(name, namespace, listener)
        .with_route(RouteSpec::to_cluster("v1"))
        .with_cluster(ClusterSpec::new(
            "v1",
            vec![Locality::service(ServiceRef::new(service, PortRef::name("grpc")))],
        ))
}

/// Membership with one subset exposing `grpc` on `port`
pub fn grpc_service(namespace: &str, name: &str, addresses: &[&str], port: u16) -> Membership {
    Membership::new(namespace, name).with_subset(Subset::new(
        addresses.iter().copied(),
        vec![MembershipPort::named("grpc", port)],
    ))
}

pub fn assembler(source: &Arc<InMemorySource>) -> SnapshotAssembler {
    SnapshotAssembler::new(source.clone(), source.clone(), Arc::new(SnapshotStore::new()))
}

pub fn decode<M: Message + Default>(value: &[u8]) -> M {
    M::decode(value).expect("resource decodes")
}

pub fn route_configuration(snapshot: &Snapshot, name: &str) -> RouteConfiguration {
    let resource = snapshot
        .resources(ROUTE_TYPE_URL)
        .into_iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("route configuration {} not in snapshot", name));
    decode(&resource.into_any().value)
}

pub fn load_assignment(snapshot: &Snapshot, cluster: &str) -> ClusterLoadAssignment {
    let resource = snapshot
        .resources(ENDPOINT_TYPE_URL)
        .into_iter()
        .find(|r| r.name == cluster)
        .unwrap_or_else(|| panic!("load assignment {} not in snapshot", cluster));
    decode(&resource.into_any().value)
}

/// `(cluster name, weight)` entries of a weighted-clusters route
pub fn weighted_clusters(route: &Route) -> Vec<(String, u32)> {
    match &route.action {
        Some(Action::Route(action)) => match &action.cluster_specifier {
            Some(ClusterSpecifier::WeightedClusters(weighted)) => weighted
                .clusters
                .iter()
                .map(|c| (c.name.clone(), c.weight.as_ref().map_or(0, |w| w.value)))
                .collect(),
            other => panic!("unexpected cluster specifier {:?}", other),
        },
        other => panic!("unexpected route action {:?}", other),
    }
}

/// `(address, port)` of every endpoint in a locality group
pub fn socket_addresses(group: &LocalityLbEndpoints) -> Vec<(String, u32)> {
    group
        .lb_endpoints
        .iter()
        .filter_map(|lb| match &lb.host_identifier {
            Some(lb_endpoint::HostIdentifier::Endpoint(endpoint)) => endpoint.address.as_ref(),
            _ => None,
        })
        .filter_map(|address| match &address.address {
            Some(address::Address::SocketAddress(socket)) => {
                let port = match socket.port_specifier {
                    Some(socket_address::PortSpecifier::PortValue(port)) => port,
                    _ => 0,
                };
                Some((socket.address.clone(), port))
            }
            _ => None,
        })
        .collect()
}

/// Picks clusters and endpoints from encoded resources with a seeded RNG.
///
/// Cluster choice follows the weights of the route action. Endpoint choice
/// uses the lowest priority that has endpoints, splits traffic across its
/// groups by `load_balancing_weight` and spreads each group evenly.
pub struct TrafficSimulator {
    rng: StdRng,
}

impl TrafficSimulator {
    pub fn new() -> Self {
        Self { rng: StdRng::seed_from_u64(SEED) }
    }

    pub fn pick_cluster(&mut self, route: &Route) -> Option<String> {
        let clusters = weighted_clusters(route);
        let total: u64 = clusters.iter().map(|(_, w)| u64::from(*w)).sum();
        if total == 0 {
            return None;
        }
        let mut sample = self.rng.gen_range(0..total);
        for (name, weight) in clusters {
            if sample < u64::from(weight) {
                return Some(name);
            }
            sample -= u64::from(weight);
        }
        None
    }

    pub fn pick_endpoint(&mut self, assignment: &ClusterLoadAssignment) -> Option<(String, u32)> {
        let priority = assignment
            .endpoints
            .iter()
            .filter(|group| !group.lb_endpoints.is_empty())
            .map(|group| group.priority)
            .min()?;

        let groups: Vec<&LocalityLbEndpoints> = assignment
            .endpoints
            .iter()
            .filter(|g| g.priority == priority && !g.lb_endpoints.is_empty())
            .collect();
        let total: u64 = groups.iter().map(|g| u64::from(weight_of(g))).sum();
        if total == 0 {
            return None;
        }

        let mut sample = self.rng.gen_range(0..total);
        for group in groups {
            let weight = u64::from(weight_of(group));
            if sample < weight {
                let addresses = socket_addresses(group);
                let index = self.rng.gen_range(0..addresses.len());
                return addresses.into_iter().nth(index);
            }
            sample -= weight;
        }
        None
    }
}

fn weight_of(group: &LocalityLbEndpoints) -> u32 {
    group.load_balancing_weight.as_ref().map_or(1, |w| w.value)
}

/// Count how often each value is produced by `draw` over `n` samples
pub fn tally<T: Ord>(n: usize, mut draw: impl FnMut() -> Option<T>) -> BTreeMap<T, usize> {
    let mut counts = BTreeMap::new();
    for _ in 0..n {
        if let Some(value) = draw() {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    counts
}
