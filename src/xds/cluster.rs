//! Cluster and load assignment synthesis using envoy-types
//!
//! Each declared cluster becomes an EDS cluster fetched over ADS plus a
//! `ClusterLoadAssignment` of the same name. Load assignments are
//! fail-closed: one unresolvable locality fails the whole assignment.

use std::collections::BTreeSet;

use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, EdsClusterConfig, LbPolicy,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;

use crate::domain::ClusterSpec;
use crate::errors::{Error, Result};

use super::endpoints::{EndpointResolver, ResolvedLocality};
use super::listener::ads_config_source;

/// EDS cluster named `name`, resolving its endpoints under the same name.
pub fn build_cluster(name: &str) -> Cluster {
    Cluster {
        name: name.to_string(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(ads_config_source()),
            service_name: name.to_string(),
            ..Default::default()
        }),
        lb_policy: LbPolicy::RoundRobin as i32,
        ..Default::default()
    }
}

/// Resolve every locality of `spec` and assemble the load assignment.
pub fn build_load_assignment(
    name: &str,
    spec: &ClusterSpec,
    resolver: &EndpointResolver<'_>,
) -> Result<ClusterLoadAssignment> {
    let localities = resolve_localities(spec, resolver)?;

    Ok(ClusterLoadAssignment {
        cluster_name: name.to_string(),
        endpoints: localities.iter().map(ResolvedLocality::to_envoy).collect(),
        ..Default::default()
    })
}

pub fn resolve_localities(
    spec: &ClusterSpec,
    resolver: &EndpointResolver<'_>,
) -> Result<Vec<ResolvedLocality>> {
    if spec.localities.is_empty() {
        return Err(Error::config(format!("cluster {:?} declares no localities", spec.name)));
    }
    check_priorities(spec)?;

    spec.localities
        .iter()
        .map(|locality| {
            resolver.resolve_locality(locality).map_err(|e| match e {
                Error::Config(message) => {
                    Error::Config(format!("cluster {:?}: {}", spec.name, message))
                }
                Error::Resolution(message) => {
                    Error::Resolution(format!("cluster {:?}: {}", spec.name, message))
                }
                other => other,
            })
        })
        .collect()
}

/// Priorities must form `0..=max`; duplicates are fine.
fn check_priorities(spec: &ClusterSpec) -> Result<()> {
    let priorities: BTreeSet<u32> = spec.localities.iter().map(|l| l.priority).collect();
    let contiguous = priorities.iter().enumerate().all(|(i, p)| *p as usize == i);
    if contiguous {
        return Ok(());
    }

    let listed: Vec<String> = priorities.iter().map(u32::to_string).collect();
    Err(Error::config(format!(
        "cluster {:?} has non-contiguous locality priorities [{}]; priorities must start at 0",
        spec.name,
        listed.join(", ")
    )))
}
