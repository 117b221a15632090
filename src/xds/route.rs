//! Route table synthesis using envoy-types
//!
//! Compiles the ordered routes of a [`RoutingSpec`] into a [`RouteTable`] and
//! renders it as a single-virtual-host Envoy `RouteConfiguration`. Every
//! route uses a weighted-clusters action whose entries carry namer-derived
//! cluster names.

use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, route_action::MaxStreamDuration,
    weighted_cluster::ClusterWeight, Route, RouteAction, RouteConfiguration, VirtualHost,
    WeightedCluster,
};
use envoy_types::pb::google::protobuf::{BoolValue, Duration, UInt32Value};
use tracing::warn;

use crate::domain::{RouteSpec, RoutingSpec};
use crate::errors::{Error, Result};

use super::matcher::{CompiledRouteMatch, RequestAttributes};
use super::naming::ResourceNamer;

/// One weighted entry of a route action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedTarget {
    /// Cluster name as declared in the routing spec
    pub local_name: String,
    /// Namer-derived name of the Envoy cluster
    pub cluster: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRoute {
    pub matcher: CompiledRouteMatch,
    pub targets: Vec<WeightedTarget>,
    pub max_stream_duration_ms: Option<u64>,
    pub grpc_timeout_header_max_ms: Option<u64>,
}

impl CompiledRoute {
    fn compile(
        spec: &RoutingSpec,
        route: &RouteSpec,
        index: usize,
        namer: &ResourceNamer,
    ) -> Result<Self> {
        if route.clusters.is_empty() {
            return Err(Error::config(format!(
                "route {} of {} has no cluster references",
                index,
                spec.key()
            )));
        }

        let matcher = CompiledRouteMatch::compile(route)?;

        let targets = route
            .clusters
            .iter()
            .map(|cluster_ref| {
                if !spec.clusters.iter().any(|c| c.name == cluster_ref.name) {
                    return Err(Error::config(format!(
                        "route {} of {} references undeclared cluster {:?}",
                        index,
                        spec.key(),
                        cluster_ref.name
                    )));
                }
                Ok(WeightedTarget {
                    local_name: cluster_ref.name.clone(),
                    cluster: namer.cluster(&cluster_ref.name),
                    weight: cluster_ref.weight,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let compiled = Self {
            matcher,
            targets,
            max_stream_duration_ms: route.max_stream_duration_ms,
            grpc_timeout_header_max_ms: route.grpc_timeout_header_max_ms,
        };

        let total_weight = compiled.total_weight();
        if total_weight > u64::from(u32::MAX) {
            return Err(Error::config(format!(
                "route {} of {} has a total cluster weight of {}, which exceeds {}",
                index,
                spec.key(),
                total_weight,
                u32::MAX
            )));
        }
        if total_weight == 0 {
            warn!(
                spec = %spec.key(),
                route = index,
                "Route has a total cluster weight of zero and will not receive traffic"
            );
        }

        Ok(compiled)
    }

    pub fn total_weight(&self) -> u64 {
        self.targets.iter().map(|t| u64::from(t.weight)).sum()
    }

    /// Select the target for `sample`, drawn uniformly from `[0, total_weight)`.
    pub fn pick(&self, sample: u64) -> Option<&WeightedTarget> {
        let mut remaining = sample;
        for target in &self.targets {
            let weight = u64::from(target.weight);
            if remaining < weight {
                return Some(target);
            }
            remaining -= weight;
        }
        None
    }

    fn to_envoy(&self) -> Route {
        let total = self.total_weight();
        let clusters = self
            .targets
            .iter()
            .map(|target| ClusterWeight {
                name: target.cluster.clone(),
                weight: Some(UInt32Value { value: target.weight }),
                ..Default::default()
            })
            .collect();

        let limits = (self.max_stream_duration_ms, self.grpc_timeout_header_max_ms);
        let max_stream_duration = match limits {
            (None, None) => None,
            (max, grpc_max) => Some(MaxStreamDuration {
                max_stream_duration: max.map(duration_from_millis),
                grpc_timeout_header_max: grpc_max.map(duration_from_millis),
                ..Default::default()
            }),
        };

        let route_action = {
            #[allow(deprecated)]
            RouteAction {
                cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
                    clusters,
                    total_weight: u32::try_from(total)
                        .ok()
                        .filter(|w| *w > 0)
                        .map(|value| UInt32Value { value }),
                    ..Default::default()
                })),
                max_stream_duration,
                ..Default::default()
            }
        };

        Route {
            r#match: Some(self.matcher.to_envoy()),
            action: Some(Action::Route(route_action)),
            ..Default::default()
        }
    }
}

/// Ordered, compiled routes of one routing spec.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTable {
    pub name: String,
    pub virtual_host: String,
    pub domains: Vec<String>,
    pub routes: Vec<CompiledRoute>,
}

impl RouteTable {
    pub fn compile(spec: &RoutingSpec, namer: &ResourceNamer) -> Result<Self> {
        let routes = spec
            .routes
            .iter()
            .enumerate()
            .map(|(index, route)| CompiledRoute::compile(spec, route, index, namer))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: namer.route_configuration(),
            virtual_host: namer.virtual_host(),
            domains: vec![spec.listener.clone()],
            routes,
        })
    }

    /// First route in declaration order whose path and headers match.
    pub fn first_match(&self, request: &RequestAttributes) -> Option<&CompiledRoute> {
        self.routes.iter().find(|route| route.matcher.matches(request))
    }

    /// Envoy cluster names referenced by any route
    pub fn referenced_clusters(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().flat_map(|r| r.targets.iter().map(|t| t.cluster.as_str()))
    }

    pub fn to_envoy(&self) -> RouteConfiguration {
        RouteConfiguration {
            name: self.name.clone(),
            virtual_hosts: vec![VirtualHost {
                name: self.virtual_host.clone(),
                domains: self.domains.clone(),
                routes: self.routes.iter().map(CompiledRoute::to_envoy).collect(),
                ..Default::default()
            }],
            validate_clusters: Some(BoolValue { value: true }),
            ..Default::default()
        }
    }
}

pub(crate) fn duration_from_millis(millis: u64) -> Duration {
    Duration {
        seconds: (millis / 1000) as i64,
        nanos: ((millis % 1000) * 1_000_000) as i32,
    }
}
