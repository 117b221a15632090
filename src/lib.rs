//! # Routeforge
//!
//! Routeforge synthesizes Envoy xDS configuration for proxyless gRPC clients.
//! Declarative routing specs and service membership go in; a consistent,
//! versioned snapshot of listeners, route configurations, clusters and
//! cluster load assignments comes out, ready for an xDS server to serve.
//!
//! ## Architecture
//!
//! ```text
//! RoutingSpecSource ─┐
//!                    ├→ SnapshotAssembler → ServiceBundle per spec → SnapshotStore
//! MembershipSource ──┘                                                    ↓
//!                                                           xDS server / readers
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use routeforge::{InMemorySource, Result, SnapshotAssembler, SnapshotStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let source = Arc::new(InMemorySource::new());
//!     let store = Arc::new(SnapshotStore::new());
//!     let assembler = SnapshotAssembler::new(source.clone(), source, store.clone());
//!
//!     let report = assembler.run_pass(&CancellationToken::new()).await?;
//!     println!("published version {}", report.version);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod storage;
pub mod xds;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Error, Result};
pub use storage::{FileSource, InMemorySource, MembershipSource, RoutingSpecSource};
pub use xds::{PassReport, Snapshot, SnapshotAssembler, SnapshotStore};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "routeforge");
    }
}
