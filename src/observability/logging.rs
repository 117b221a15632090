//! # Structured Logging
//!
//! Subscriber setup and span helpers for synthesis passes. Every pass runs
//! inside a `synthesis_pass` span carrying its `pass_id`, so all events
//! emitted while synthesizing (including those from blocking workers that
//! re-enter the span) can be correlated.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Create a tracing span for one synthesis pass.
///
/// ```rust,ignore
/// let span = pass_span!(pass_id, version = 7);
/// ```
#[macro_export]
macro_rules! pass_span {
    ($pass_id:expr) => {
        tracing::info_span!(
            "synthesis_pass",
            pass_id = %$pass_id,
            version = tracing::field::Empty
        )
    };
    ($pass_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "synthesis_pass",
            pass_id = %$pass_id,
            $($field)*
        )
    };
}

/// Create a tracing span for synthesizing one routing spec
#[macro_export]
macro_rules! spec_span {
    ($key:expr) => {
        tracing::debug_span!("synthesize_spec", spec = %$key)
    };
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Installing twice is a no-op.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(error) = result {
        tracing::debug!(%error, "Global subscriber already installed");
    }
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::Config) {
    tracing::info!(
        namespace = %config.engine.namespace,
        parallelism = config.engine.parallelism,
        log_level = %config.observability.log_level,
        json_logging = config.observability.json_logging,
        metrics_port = config.observability.metrics_port,
        "routeforge configuration"
    );
}
