//! Listener synthesis using envoy-types
//!
//! Proxyless gRPC clients resolve a service through an API listener whose
//! HTTP connection manager fetches its routes over RDS on the aggregated
//! stream. One listener is emitted per routing spec.

use envoy_types::pb::envoy::config::core::v3::{
    config_source::ConfigSourceSpecifier, AggregatedConfigSource, ApiVersion, ConfigSource,
    HttpProtocolOptions,
};
use envoy_types::pb::envoy::config::listener::v3::{ApiListener, Listener};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use prost::Message;

use crate::domain::RoutingSpec;
use crate::errors::{Error, Result};

use super::resources::any_from_message;
use super::route::duration_from_millis;

pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
pub const ROUTER_FILTER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";

/// Build the API listener for `spec`, routing through `route_config_name`.
pub fn build_listener(spec: &RoutingSpec, route_config_name: &str) -> Result<Listener> {
    if spec.listener.trim().is_empty() {
        return Err(Error::config(format!("{} does not name a listener", spec.key())));
    }

    let hcm = HttpConnectionManager {
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            route_config_name: route_config_name.to_string(),
            config_source: Some(ads_config_source()),
        })),
        http_filters: vec![router_filter()],
        common_http_protocol_options: spec.max_stream_duration_ms.map(|millis| {
            HttpProtocolOptions {
                max_stream_duration: Some(duration_from_millis(millis)),
                ..Default::default()
            }
        }),
        ..Default::default()
    };

    Ok(Listener {
        name: spec.listener.clone(),
        api_listener: Some(ApiListener {
            api_listener: Some(any_from_message(HTTP_CONNECTION_MANAGER_TYPE_URL, &hcm)),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Route configuration name the listener's connection manager asks for.
pub fn rds_route_config_name(listener: &Listener) -> Result<Option<String>> {
    let Some(any) = listener.api_listener.as_ref().and_then(|a| a.api_listener.as_ref()) else {
        return Ok(None);
    };
    if any.type_url != HTTP_CONNECTION_MANAGER_TYPE_URL {
        return Ok(None);
    }

    let hcm = HttpConnectionManager::decode(any.value.as_slice()).map_err(|e| {
        Error::internal(format!(
            "listener {} has an undecodable connection manager: {}",
            listener.name, e
        ))
    })?;

    Ok(match hcm.route_specifier {
        Some(RouteSpecifier::Rds(rds)) => Some(rds.route_config_name),
        _ => None,
    })
}

pub(crate) fn ads_config_source() -> ConfigSource {
    ConfigSource {
        resource_api_version: ApiVersion::V3 as i32,
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(
            AggregatedConfigSource::default(),
        )),
        ..Default::default()
    }
}

fn router_filter() -> HttpFilter {
    HttpFilter {
        name: ROUTER_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            ROUTER_FILTER_TYPE_URL,
            &RouterFilter::default(),
        ))),
        ..Default::default()
    }
}
