//! Domain layer
//!
//! Pure declarative inputs to the synthesis engine with zero Envoy
//! dependencies. The `xds` module compiles these into proxy resources.
//!
//! ## Module Organization
//!
//! - `id`: Namespace-qualified identifiers
//! - `routing_spec`: Listener, routes and clusters for one logical service
//! - `membership`: Live endpoint addresses and ports backing a service

pub mod id;
pub mod membership;
pub mod routing_spec;

pub use id::NamespacedName;
pub use membership::{Membership, MembershipIndex, MembershipPort, Subset};
pub use routing_spec::{
    ClusterRef, ClusterSpec, HeaderMatcherSpec, Locality, PathMatcherSpec, PortRef, RangeSpec,
    RegexMatcherSpec, RouteSpec, RoutingSpec, RuntimeFractionSpec, ServiceRef,
    DEFAULT_REGEX_ENGINE,
};
