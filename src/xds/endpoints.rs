//! Locality resolution against live membership
//!
//! A locality names a backing service and a port; the resolver turns it into
//! concrete socket addresses using the membership observed for this pass.

use envoy_types::pb::envoy::config::core::v3::{
    address, socket_address, Address, Locality as EnvoyLocality, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::google::protobuf::UInt32Value;

use crate::domain::{Locality, MembershipIndex, MembershipPort, NamespacedName, PortRef, Subset};
use crate::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub address: String,
    pub port: u16,
}

/// Endpoints of one locality with its weight and priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocality {
    pub service: NamespacedName,
    pub endpoints: Vec<ResolvedEndpoint>,
    pub weight: u32,
    pub priority: u32,
}

impl ResolvedLocality {
    pub fn to_envoy(&self) -> LocalityLbEndpoints {
        LocalityLbEndpoints {
            locality: Some(EnvoyLocality {
                sub_zone: self.service.name.clone(),
                ..Default::default()
            }),
            lb_endpoints: self.endpoints.iter().map(lb_endpoint_for).collect(),
            load_balancing_weight: Some(UInt32Value { value: self.weight }),
            priority: self.priority,
            ..Default::default()
        }
    }
}

fn lb_endpoint_for(endpoint: &ResolvedEndpoint) -> LbEndpoint {
    LbEndpoint {
        host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(Endpoint {
            address: Some(Address {
                address: Some(address::Address::SocketAddress(SocketAddress {
                    address: endpoint.address.clone(),
                    port_specifier: Some(socket_address::PortSpecifier::PortValue(
                        endpoint.port.into(),
                    )),
                    protocol: socket_address::Protocol::Tcp as i32,
                    ..Default::default()
                })),
            }),
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Resolves localities of one routing spec.
pub struct EndpointResolver<'a> {
    membership: &'a MembershipIndex,
    default_namespace: &'a str,
}

impl<'a> EndpointResolver<'a> {
    /// `default_namespace` applies to service references without one
    pub fn new(membership: &'a MembershipIndex, default_namespace: &'a str) -> Self {
        Self { membership, default_namespace }
    }

    pub fn resolve_locality(&self, locality: &Locality) -> Result<ResolvedLocality> {
        let service = locality
            .service
            .as_ref()
            .ok_or_else(|| Error::config("unsupported non-service locality"))?;

        let namespace = service.namespace.as_deref().unwrap_or(self.default_namespace);
        let key = NamespacedName::new(namespace, &service.name);

        let membership = self
            .membership
            .get(namespace, &service.name)
            .ok_or_else(|| Error::resolution(format!("no endpoints found for service {}", key)))?;

        let mut endpoints = Vec::with_capacity(membership.address_count());
        for subset in &membership.subsets {
            let port = resolve_port(subset, &service.port).ok_or_else(|| {
                Error::resolution(format!("{} not found on service {}", service.port, key))
            })?;
            endpoints.extend(
                subset
                    .addresses
                    .iter()
                    .map(|address| ResolvedEndpoint { address: address.clone(), port }),
            );
        }

        Ok(ResolvedLocality {
            service: key,
            endpoints,
            weight: locality.weight,
            priority: locality.priority,
        })
    }
}

fn resolve_port(subset: &Subset, port: &PortRef) -> Option<u16> {
    let matches = |candidate: &&MembershipPort| match port {
        PortRef::Name(name) => candidate.name.as_deref() == Some(name.as_str()),
        PortRef::Number(number) => candidate.port == *number,
    };
    subset.ports.iter().find(matches).map(|p| p.port)
}
