//! Encoded xDS resources
//!
//! [`BuiltResource`] is the shape a discovery server places into
//! `DiscoveryResponse.resources`: a resource name plus the message packed as
//! `google.protobuf.Any` under its canonical v3 type URL.

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use tracing::debug;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

/// Every resource type a snapshot carries, in dependency order
pub const ALL_TYPE_URLS: [&str; 4] =
    [LISTENER_TYPE_URL, ROUTE_TYPE_URL, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL];

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn listener(listener: &Listener) -> Self {
        Self::encode(&listener.name, LISTENER_TYPE_URL, listener)
    }

    pub fn route_configuration(route_configuration: &RouteConfiguration) -> Self {
        Self::encode(&route_configuration.name, ROUTE_TYPE_URL, route_configuration)
    }

    pub fn cluster(cluster: &Cluster) -> Self {
        Self::encode(&cluster.name, CLUSTER_TYPE_URL, cluster)
    }

    pub fn load_assignment(load_assignment: &ClusterLoadAssignment) -> Self {
        Self::encode(&load_assignment.cluster_name, ENDPOINT_TYPE_URL, load_assignment)
    }

    fn encode<M: Message>(name: &str, type_url: &str, message: &M) -> Self {
        let resource = any_from_message(type_url, message);
        debug!(resource = %name, type_url, bytes = resource.value.len(), "Encoded resource");
        Self { name: name.to_string(), resource }
    }

    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

pub fn any_from_message<M: Message>(type_url: impl Into<String>, message: &M) -> Any {
    Any { type_url: type_url.into(), value: message.encode_to_vec() }
}
