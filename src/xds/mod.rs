//! # xDS Synthesis
//!
//! Turns routing specs and service membership into Envoy v3 resources and
//! publishes them as versioned snapshots:
//!
//! - `matcher` compiles path, header and runtime fraction matchers
//! - `route` and `listener` build the route table and the API listener
//! - `endpoints` and `cluster` resolve localities into EDS clusters
//! - `bundle` groups one spec's resources
//! - `assembler` and `snapshot` run passes and publish generations

pub mod assembler;
pub mod bundle;
pub mod cluster;
pub mod endpoints;
pub mod listener;
pub mod matcher;
pub mod naming;
pub mod resources;
pub mod route;
pub mod snapshot;

pub use assembler::{AssemblerSettings, PassReport, SnapshotAssembler, SynthesisFailure};
pub use bundle::{synthesize_bundle, ServiceBundle};
pub use endpoints::{EndpointResolver, ResolvedEndpoint, ResolvedLocality};
pub use matcher::{
    CompiledRegex, CompiledRouteMatch, FractionDenominator, HeaderMatchKind, HeaderMatcher,
    PathMatcher, RequestAttributes, RuntimeFraction,
};
pub use naming::ResourceNamer;
pub use resources::{
    BuiltResource, ALL_TYPE_URLS, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
};
pub use route::{CompiledRoute, RouteTable, WeightedTarget};
pub use snapshot::{Snapshot, SnapshotStore, SnapshotSummary};
