//! Versioned snapshots and their publication
//!
//! A [`Snapshot`] is the union of every service bundle at a point in time.
//! The [`SnapshotStore`] holds exactly one live snapshot behind an atomically
//! swapped `Arc`: readers load it without locking and always observe a whole
//! generation, never a partially updated one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use envoy_types::pb::envoy::config::route::v3::{route::Action, route_action::ClusterSpecifier};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::NamespacedName;
use crate::errors::{Error, Result};

use super::bundle::ServiceBundle;
use super::listener::rds_route_config_name;
use super::resources::{
    BuiltResource, ALL_TYPE_URLS, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
};

/// Immutable, versioned set of service bundles. Resources are encoded once
/// when the snapshot is built.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    bundles: BTreeMap<NamespacedName, Arc<ServiceBundle>>,
    encoded: HashMap<&'static str, Vec<BuiltResource>>,
    created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(version: u64, bundles: BTreeMap<NamespacedName, Arc<ServiceBundle>>) -> Self {
        let encoded = ALL_TYPE_URLS
            .into_iter()
            .map(|type_url| {
                let resources = bundles.values().flat_map(|b| b.resources(type_url)).collect();
                (type_url, resources)
            })
            .collect();
        Self { version, bundles, encoded, created_at: Utc::now() }
    }

    /// The generation readers see before anything has been published
    pub fn empty() -> Self {
        Self::new(0, BTreeMap::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version string as carried in `DiscoveryResponse.version_info`
    pub fn version_info(&self) -> String {
        self.version.to_string()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundles(&self) -> impl Iterator<Item = &Arc<ServiceBundle>> {
        self.bundles.values()
    }

    pub fn bundle(&self, key: &NamespacedName) -> Option<&Arc<ServiceBundle>> {
        self.bundles.get(key)
    }

    /// Encoded resources of one type across all bundles, ordered by spec key
    pub fn resources(&self, type_url: &str) -> Vec<BuiltResource> {
        self.encoded.get(type_url).cloned().unwrap_or_default()
    }

    pub fn resource_names(&self, type_url: &str) -> Vec<String> {
        self.bundles.values().flat_map(|b| b.resource_names(type_url)).collect()
    }

    pub fn resource_count(&self) -> usize {
        self.bundles.values().map(|b| b.resource_count()).sum()
    }

    /// Verify every cross-reference resolves inside this snapshot and that
    /// names are unique per resource type.
    pub fn check_consistency(&self) -> Result<()> {
        let mut names: HashMap<&str, HashSet<String>> = HashMap::new();
        for type_url in ALL_TYPE_URLS {
            let mut seen = HashSet::new();
            for name in self.resource_names(type_url) {
                if !seen.insert(name.clone()) {
                    return Err(Error::internal(format!(
                        "snapshot {} carries {} twice for {}",
                        self.version, name, type_url
                    )));
                }
            }
            names.insert(type_url, seen);
        }

        let has = |type_url: &str, name: &str| {
            names.get(type_url).is_some_and(|set| set.contains(name))
        };

        for bundle in self.bundles.values() {
            let route_config = rds_route_config_name(&bundle.listener)?.ok_or_else(|| {
                Error::internal(format!("listener {} does not use RDS", bundle.listener.name))
            })?;
            if !has(ROUTE_TYPE_URL, &route_config) {
                return Err(dangling(self.version, &bundle.listener.name, &route_config));
            }

            for vhost in &bundle.route_configuration.virtual_hosts {
                for route in &vhost.routes {
                    for cluster in referenced_clusters(route) {
                        if !has(CLUSTER_TYPE_URL, cluster) {
                            let from = &bundle.route_configuration.name;
                            return Err(dangling(self.version, from, cluster));
                        }
                    }
                }
            }

            for cluster in &bundle.clusters {
                let service_name = cluster
                    .eds_cluster_config
                    .as_ref()
                    .map(|eds| eds.service_name.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(cluster.name.as_str());
                if !has(ENDPOINT_TYPE_URL, service_name) {
                    return Err(dangling(self.version, &cluster.name, service_name));
                }
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> SnapshotSummary {
        let resources = [
            ("listeners", LISTENER_TYPE_URL),
            ("routeConfigurations", ROUTE_TYPE_URL),
            ("clusters", CLUSTER_TYPE_URL),
            ("loadAssignments", ENDPOINT_TYPE_URL),
        ]
        .into_iter()
        .map(|(label, type_url)| (label.to_string(), self.resource_names(type_url)))
        .collect();

        SnapshotSummary {
            version: self.version,
            created_at: self.created_at,
            specs: self.bundles.keys().map(ToString::to_string).collect(),
            resources,
        }
    }
}

fn referenced_clusters(
    route: &envoy_types::pb::envoy::config::route::v3::Route,
) -> Vec<&str> {
    match &route.action {
        Some(Action::Route(action)) => match &action.cluster_specifier {
            Some(ClusterSpecifier::Cluster(name)) => vec![name.as_str()],
            Some(ClusterSpecifier::WeightedClusters(weighted)) => {
                weighted.clusters.iter().map(|c| c.name.as_str()).collect()
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn dangling(version: u64, from: &str, to: &str) -> Error {
    Error::internal(format!(
        "snapshot {} has a dangling reference from {} to {}",
        version, from, to
    ))
}

/// Serializable overview of a snapshot, used by the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub specs: Vec<String>,
    pub resources: BTreeMap<String, Vec<String>>,
}

/// Holder of the single live snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    next_version: AtomicU64,
    publish_lock: Mutex<()>,
    updates: watch::Sender<u64>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            next_version: AtomicU64::new(1),
            publish_lock: Mutex::new(()),
            updates,
        }
    }

    /// Lock-free read of the live snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Reserve the version for the next snapshot. Reserved versions that are
    /// never published leave gaps; versions are never reused.
    pub fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish `snapshot` as the live generation. Rejects snapshots that fail
    /// the consistency check or do not advance the version.
    pub fn publish(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        let _guard = self.publish_lock.lock();

        snapshot.check_consistency()?;

        let previous = self.current.load();
        if snapshot.version <= previous.version {
            return Err(Error::internal(format!(
                "snapshot version {} does not advance past {}",
                snapshot.version, previous.version
            )));
        }

        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::clone(&snapshot));
        self.updates.send_replace(snapshot.version);

        info!(
            phase = "publish",
            version = snapshot.version,
            previous_version = previous.version,
            bundles = snapshot.bundles.len(),
            resources = snapshot.resource_count(),
            "Published snapshot"
        );
        for type_url in ALL_TYPE_URLS {
            debug!(
                version = snapshot.version,
                type_url,
                names = ?snapshot.resource_names(type_url),
                "Snapshot resources"
            );
        }

        Ok(snapshot)
    }

    /// Receiver woken with the version of every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
