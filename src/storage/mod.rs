//! # Input Sources
//!
//! The synthesis engine reads its two inputs through list interfaces so that
//! the store behind them (an API server cache, files on disk, test fixtures)
//! stays outside the engine. A failing list is a transient error: the pass
//! aborts and nothing is published.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::domain::{Membership, RoutingSpec};
use crate::errors::Result;

pub use file::FileSource;
pub use memory::InMemorySource;

/// Lists every routing spec the engine should serve
#[async_trait]
pub trait RoutingSpecSource: Send + Sync {
    async fn list_routing_specs(&self) -> Result<Vec<RoutingSpec>>;
}

/// Lists the endpoint membership of every known service
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn list_membership(&self) -> Result<Vec<Membership>>;
}
