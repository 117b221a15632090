//! Synthesis passes
//!
//! One pass lists every routing spec and all membership, synthesizes a bundle
//! per spec on the blocking pool, folds in the previous generation for specs
//! that failed, and publishes the result as a single new snapshot. Passes are
//! serialized by the caller; readers of the store are never blocked.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{MembershipIndex, NamespacedName, RoutingSpec};
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::storage::{MembershipSource, RoutingSpecSource};

use super::bundle::{synthesize_bundle, ServiceBundle};
use super::resources::ALL_TYPE_URLS;
use super::snapshot::{Snapshot, SnapshotStore};

/// A routing spec that did not contribute a fresh bundle to the pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisFailure {
    pub spec: NamespacedName,
    /// Error kind label (`config`, `resolution`, ...)
    pub kind: &'static str,
    pub message: String,
    /// Whether the previously published bundle is still being served
    pub retained: bool,
}

/// Outcome of a published pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub pass_id: Uuid,
    pub version: u64,
    pub synthesized: Vec<NamespacedName>,
    pub retained: Vec<NamespacedName>,
    pub removed: Vec<NamespacedName>,
    pub failures: Vec<SynthesisFailure>,
    pub duration_ms: u128,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// Maximum number of specs synthesized at once
    pub parallelism: usize,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self { parallelism: EngineConfig::default().parallelism }
    }
}

impl From<&EngineConfig> for AssemblerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self { parallelism: config.parallelism.max(1) }
    }
}

type Synthesizer = fn(&RoutingSpec, &MembershipIndex) -> Result<ServiceBundle>;

/// Drives synthesis passes into a [`SnapshotStore`].
pub struct SnapshotAssembler {
    specs: Arc<dyn RoutingSpecSource>,
    membership: Arc<dyn MembershipSource>,
    store: Arc<SnapshotStore>,
    settings: AssemblerSettings,
    metrics: MetricsRecorder,
    synthesize: Synthesizer,
}

impl SnapshotAssembler {
    pub fn new(
        specs: Arc<dyn RoutingSpecSource>,
        membership: Arc<dyn MembershipSource>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            specs,
            membership,
            store,
            settings: AssemblerSettings::default(),
            metrics: MetricsRecorder::new(),
            synthesize: synthesize_bundle,
        }
    }

    pub fn with_settings(mut self, settings: AssemblerSettings) -> Self {
        self.settings = settings;
        self
    }

    #[cfg(test)]
    fn with_synthesizer(mut self, synthesize: Synthesizer) -> Self {
        self.synthesize = synthesize;
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Run one pass and publish its snapshot.
    ///
    /// Source failures abort the pass and nothing is published. Specs that
    /// fail to synthesize keep their last published bundle and are listed in
    /// [`PassReport::failures`]. A cancelled pass publishes nothing and
    /// returns [`Error::Cancelled`].
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let pass_id = Uuid::new_v4();
        let span = crate::pass_span!(pass_id);
        let started = Instant::now();

        let result = self.run_pass_inner(pass_id, started, cancel).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "published",
            Err(Error::Cancelled) => "cancelled",
            Err(_) => "aborted",
        };
        self.metrics.record_pass(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn run_pass_inner(
        &self,
        pass_id: Uuid,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<PassReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (specs, membership) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            listed = async {
                tokio::try_join!(self.specs.list_routing_specs(), self.membership.list_membership())
            } => listed.inspect_err(|e| {
                warn!(
                    phase = "list",
                    error = %e,
                    retryable = e.is_retryable(),
                    "Failed to list inputs, aborting pass"
                );
            })?,
        };

        // Later duplicates of the same key replace earlier ones
        let specs: BTreeMap<NamespacedName, RoutingSpec> =
            specs.into_iter().map(|spec| (spec.key(), spec)).collect();
        let membership: Arc<MembershipIndex> = Arc::new(membership.into_iter().collect());

        info!(
            phase = "list",
            specs = specs.len(),
            services = membership.len(),
            "Starting synthesis pass"
        );

        let listed: Vec<NamespacedName> = specs.keys().cloned().collect();
        let mut results = self.synthesize_all(specs, membership, cancel).await?;

        let previous = self.store.current();
        let mut bundles = BTreeMap::new();
        let mut claimed: HashMap<String, NamespacedName> = HashMap::new();
        let mut synthesized = Vec::new();
        let mut retained = Vec::new();
        let mut failures = Vec::new();

        for key in listed {
            let fresh = results
                .remove(&key)
                .unwrap_or_else(|| Err(Error::internal("synthesis result missing")));

            let error = match fresh {
                Ok(bundle) => match listener_conflict(&claimed, &key, &bundle) {
                    None => {
                        claimed.insert(bundle.listener_name().to_string(), key.clone());
                        bundles.insert(key.clone(), Arc::new(bundle));
                        synthesized.push(key);
                        continue;
                    }
                    Some(conflict) => conflict,
                },
                Err(e) => e,
            };

            let prior = previous
                .bundle(&key)
                .filter(|b| listener_conflict(&claimed, &key, b).is_none())
                .cloned();
            let is_retained = prior.is_some();
            if let Some(prior) = prior {
                claimed.insert(prior.listener_name().to_string(), key.clone());
                bundles.insert(key.clone(), prior);
                retained.push(key.clone());
            }

            warn!(
                phase = "synthesize",
                spec = %key,
                kind = error.kind(),
                error = %error,
                retained = is_retained,
                "Routing spec failed to synthesize"
            );
            self.metrics.record_spec_failure(error.kind());
            failures.push(SynthesisFailure {
                spec: key,
                kind: error.kind(),
                message: error.to_string(),
                retained: is_retained,
            });
        }

        let removed: Vec<NamespacedName> = previous
            .bundles()
            .map(|b| b.key.clone())
            .filter(|k| !bundles.contains_key(k))
            .collect();

        if cancel.is_cancelled() {
            info!(phase = "publish", "Pass cancelled before publish");
            return Err(Error::Cancelled);
        }

        let version = self.store.next_version();
        Span::current().record("version", version);
        let snapshot = self.store.publish(Snapshot::new(version, bundles))?;

        self.metrics.record_published(version, snapshot.bundles().count(), retained.len());
        for type_url in ALL_TYPE_URLS {
            self.metrics.record_resource_count(type_url, snapshot.resource_names(type_url).len());
        }

        let report = PassReport {
            pass_id,
            version,
            synthesized,
            retained,
            removed,
            failures,
            duration_ms: started.elapsed().as_millis(),
        };

        info!(
            phase = "complete",
            version,
            synthesized = report.synthesized.len(),
            retained = report.retained.len(),
            removed = report.removed.len(),
            failures = report.failures.len(),
            duration_ms = report.duration_ms as u64,
            "Synthesis pass complete"
        );

        Ok(report)
    }

    /// Synthesize every spec on the blocking pool, at most `parallelism` at once.
    async fn synthesize_all(
        &self,
        specs: BTreeMap<NamespacedName, RoutingSpec>,
        membership: Arc<MembershipIndex>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<NamespacedName, Result<ServiceBundle>>> {
        let limit = Arc::new(Semaphore::new(self.settings.parallelism.max(1)));
        let mut tasks = JoinSet::new();
        let mut task_keys = HashMap::new();
        let synthesize = self.synthesize;

        for (key, spec) in specs {
            let limit = Arc::clone(&limit);
            let membership = Arc::clone(&membership);
            let span = crate::spec_span!(key);
            let handle = tasks.spawn(
                async move {
                    let _permit = limit
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::internal(format!("synthesis limiter closed: {}", e)))?;
                    let worker_span = Span::current();
                    tokio::task::spawn_blocking(move || {
                        worker_span.in_scope(|| synthesize(&spec, &membership))
                    })
                    .await
                    .map_err(|e| Error::internal(format!("synthesis worker failed: {}", e)))?
                }
                .instrument(span),
            );
            task_keys.insert(handle.id(), key);
        }

        let mut results = HashMap::new();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    info!(phase = "synthesize", "Pass cancelled during synthesis");
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next_with_id() => joined,
            };

            let (id, result) = match joined {
                None => break,
                Some(Ok((id, result))) => (id, result),
                Some(Err(e)) => {
                    (e.id(), Err(Error::internal(format!("synthesis task failed: {}", e))))
                }
            };
            if let Some(key) = task_keys.remove(&id) {
                results.insert(key, result);
            }
        }

        Ok(results)
    }
}

fn listener_conflict(
    claimed: &HashMap<String, NamespacedName>,
    key: &NamespacedName,
    bundle: &ServiceBundle,
) -> Option<Error> {
    claimed.get(bundle.listener_name()).filter(|owner| *owner != key).map(|owner| {
        Error::config(format!(
            "listener {:?} of {} is already served by {}",
            bundle.listener_name(),
            key,
            owner
        ))
    })
}
