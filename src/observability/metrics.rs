//! # Metrics Collection
//!
//! Synthesis metrics recorded through the `metrics` facade. Without an
//! installed recorder every call is a no-op; `init_metrics` installs the
//! Prometheus exporter when a port is configured.

use std::net::SocketAddr;

use ::tracing::{info, warn};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Metrics recorder that tracks synthesis activity
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a finished pass; `outcome` is `published`, `aborted` or `cancelled`
    pub fn record_pass(&self, outcome: &str, duration: f64) {
        let labels = [("outcome", outcome.to_string())];
        counter!("routeforge_passes_total", &labels).increment(1);
        histogram!("routeforge_pass_duration_seconds", &labels).record(duration);
    }

    /// Record a routing spec that failed to synthesize
    pub fn record_spec_failure(&self, kind: &str) {
        let labels = [("kind", kind.to_string())];
        counter!("routeforge_spec_failures_total", &labels).increment(1);
    }

    /// Update gauges describing the live snapshot
    pub fn record_published(&self, version: u64, bundles: usize, retained: usize) {
        gauge!("routeforge_snapshot_version").set(version as f64);
        gauge!("routeforge_snapshot_bundles").set(bundles as f64);
        gauge!("routeforge_snapshot_retained_bundles").set(retained as f64);
    }

    /// Update the resource count gauge for one resource type
    pub fn record_resource_count(&self, type_url: &str, count: usize) {
        let labels = [("type_url", type_url.to_string())];
        gauge!("routeforge_snapshot_resources", &labels).set(count as f64);
    }

    pub fn register_synthesis_metrics(&self) {
        describe_counter!("routeforge_passes_total", Unit::Count, "Synthesis passes by outcome");
        describe_histogram!(
            "routeforge_pass_duration_seconds",
            Unit::Seconds,
            "Wall-clock duration of synthesis passes"
        );
        describe_counter!(
            "routeforge_spec_failures_total",
            Unit::Count,
            "Routing specs that failed to synthesize, by error kind"
        );
        describe_gauge!("routeforge_snapshot_version", Unit::Count, "Version of the live snapshot");
        describe_gauge!(
            "routeforge_snapshot_bundles",
            Unit::Count,
            "Service bundles in the live snapshot"
        );
        describe_gauge!(
            "routeforge_snapshot_retained_bundles",
            Unit::Count,
            "Bundles carried over from an earlier pass after their spec failed"
        );
        describe_gauge!(
            "routeforge_snapshot_resources",
            Unit::Count,
            "Resources in the live snapshot per type URL"
        );
    }
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no port configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", crate::APP_NAME)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_synthesis_metrics();

    info!(metrics_addr = %metrics_addr, "Metrics collection initialized");
    Ok(())
}
