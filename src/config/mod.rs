//! # Configuration Management
//!
//! Runtime settings for the synthesis engine, read from `ROUTEFORGE_*`
//! environment variables with defaults and validated before use.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ROUTEFORGE_NAMESPACE` | `*` (all namespaces) |
//! | `ROUTEFORGE_PARALLELISM` | available CPUs |
//! | `ROUTEFORGE_LOG_LEVEL` | `info` |
//! | `ROUTEFORGE_JSON_LOGS` | `false` |
//! | `ROUTEFORGE_METRICS_PORT` | `0` (disabled) |

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};

/// Wildcard for [`EngineConfig::namespace`]
pub const ALL_NAMESPACES: &str = "*";

/// Upper bound on concurrently synthesized specs
pub const MAX_PARALLELISM: usize = 1024;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub engine: EngineConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Synthesis pass settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Namespace routing specs are read from, `*` for every namespace
    #[validate(length(min = 1, message = "Namespace cannot be empty"))]
    pub namespace: String,

    /// Maximum number of specs synthesized concurrently
    #[validate(range(
        min = 1,
        max = MAX_PARALLELISM,
        message = "Parallelism must be between 1 and 1024"
    ))]
    pub parallelism: usize,
}

impl EngineConfig {
    /// The namespace scope, `None` when every namespace is selected
    pub fn namespace_scope(&self) -> Option<&str> {
        (self.namespace != ALL_NAMESPACES).then_some(self.namespace.as_str())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { namespace: ALL_NAMESPACES.to_string(), parallelism: default_parallelism() }
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Prometheus exporter port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false, metrics_port: 0 }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            engine: EngineConfig {
                namespace: lookup("ROUTEFORGE_NAMESPACE").unwrap_or(defaults.engine.namespace),
                parallelism: parse_var(&lookup, "ROUTEFORGE_PARALLELISM")?
                    .unwrap_or(defaults.engine.parallelism),
            },
            observability: ObservabilityConfig {
                log_level: lookup("ROUTEFORGE_LOG_LEVEL")
                    .unwrap_or(defaults.observability.log_level),
                json_logging: parse_var(&lookup, "ROUTEFORGE_JSON_LOGS")?
                    .unwrap_or(defaults.observability.json_logging),
                metrics_port: parse_var(&lookup, "ROUTEFORGE_METRICS_PORT")?
                    .unwrap_or(defaults.observability.metrics_port),
            },
        };

        config.validate_config()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate_config(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("Invalid {} {:?}: {}", key, raw, e))),
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4).min(MAX_PARALLELISM)
}
