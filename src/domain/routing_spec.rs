//! Routing spec domain types
//!
//! Declarative description of one logical service: the listener it is served
//! on, an ordered route table and the clusters those routes point at. These
//! types mirror the user-facing document shape and carry no Envoy types; the
//! `xds` module compiles them.

use serde::{Deserialize, Serialize};

use super::id::NamespacedName;

/// Regex engine accepted by the matcher compiler.
pub const DEFAULT_REGEX_ENGINE: &str = "re2";

fn default_namespace() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

fn default_engine() -> String {
    DEFAULT_REGEX_ENGINE.to_string()
}

/// One logical service's listener, routes and clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSpec {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Listener name proxies use to address this service (e.g. `xds:///echo_server`)
    pub listener: String,
    /// Upper bound on any stream handled by the listener, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stream_duration_ms: Option<u64>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub clusters: Vec<ClusterSpec>,
}

impl RoutingSpec {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        listener: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            listener: listener.into(),
            max_stream_duration_ms: None,
            routes: Vec::new(),
            clusters: Vec::new(),
        }
    }

    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(&self.namespace, &self.name)
    }

    pub fn with_route(mut self, route: RouteSpec) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_cluster(mut self, cluster: ClusterSpec) -> Self {
        self.clusters.push(cluster);
        self
    }
}

/// A single route: match criteria plus a weighted set of clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default)]
    pub path: PathMatcherSpec,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatcherSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_fraction: Option<RuntimeFractionSpec>,
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stream_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_timeout_header_max_ms: Option<u64>,
}

impl RouteSpec {
    /// Route matching every path and sending all traffic to `cluster`.
    pub fn to_cluster(cluster: impl Into<String>) -> Self {
        Self {
            path: PathMatcherSpec::default(),
            case_sensitive: true,
            headers: Vec::new(),
            runtime_fraction: None,
            clusters: vec![ClusterRef::new(cluster, 1)],
            max_stream_duration_ms: None,
            grpc_timeout_header_max_ms: None,
        }
    }

    pub fn with_path(mut self, path: PathMatcherSpec) -> Self {
        self.path = path;
        self
    }

    pub fn case_sensitive(mut self, sensitive: bool) -> Self {
        self.case_sensitive = sensitive;
        self
    }

    pub fn with_header(mut self, header: HeaderMatcherSpec) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_clusters(mut self, clusters: Vec<ClusterRef>) -> Self {
        self.clusters = clusters;
        self
    }
}

/// Path match criteria. When several fields are set, regex wins over an
/// exact path, which wins over a prefix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMatcherSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexMatcherSpec>,
}

impl PathMatcherSpec {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()), ..Default::default() }
    }

    pub fn exact(path: impl Into<String>) -> Self {
        Self { path: Some(path.into()), ..Default::default() }
    }

    pub fn regex(regex: impl Into<String>) -> Self {
        Self { regex: Some(RegexMatcherSpec::re2(regex)), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexMatcherSpec {
    pub regex: String,
    #[serde(default = "default_engine")]
    pub engine: String,
}

impl RegexMatcherSpec {
    pub fn re2(regex: impl Into<String>) -> Self {
        Self { regex: regex.into(), engine: default_engine() }
    }
}

/// Header match criteria. Exactly one of the match kinds must be set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatcherSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexMatcherSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default)]
    pub invert: bool,
}

impl HeaderMatcherSpec {
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), exact: Some(value.into()), ..Default::default() }
    }

    pub fn present(name: impl Into<String>) -> Self {
        Self { name: name.into(), present: Some(true), ..Default::default() }
    }

    pub fn prefix(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self { name: name.into(), prefix: Some(prefix.into()), ..Default::default() }
    }

    pub fn suffix(name: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self { name: name.into(), suffix: Some(suffix.into()), ..Default::default() }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

/// Half-open integer range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub start: i64,
    pub end: i64,
}

/// Fraction of matching traffic admitted by the route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFractionSpec {
    pub numerator: u32,
    /// One of `HUNDRED`, `TEN_THOUSAND`, `MILLION` (case-insensitive)
    pub denominator: String,
}

/// Reference to a cluster declared in the same routing spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ClusterRef {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self { name: name.into(), weight }
    }
}

/// Group of localities serving the same upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(default)]
    pub localities: Vec<Locality>,
}

impl ClusterSpec {
    pub fn new(name: impl Into<String>, localities: Vec<Locality>) -> Self {
        Self { name: name.into(), localities }
    }
}

/// Weighted, prioritized group of endpoints backed by one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRef>,
}

impl Locality {
    pub fn service(service: ServiceRef) -> Self {
        Self { weight: 1, priority: 0, service: Some(service) }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Reference to the service whose membership backs a locality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub name: String,
    /// Defaults to the owning routing spec's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub port: PortRef,
}

impl ServiceRef {
    pub fn new(name: impl Into<String>, port: PortRef) -> Self {
        Self { name: name.into(), namespace: None, port }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Port selector, by declared port name or by port number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PortRefDocument", into = "PortRefDocument")]
pub enum PortRef {
    Name(String),
    Number(u16),
}

impl PortRef {
    pub fn name(name: impl Into<String>) -> Self {
        PortRef::Name(name.into())
    }
}

/// On-disk shape of a port selector: `{name: grpc}` or `{number: 3333}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PortRefDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    number: Option<u16>,
}

impl TryFrom<PortRefDocument> for PortRef {
    type Error = String;

    fn try_from(doc: PortRefDocument) -> Result<Self, Self::Error> {
        match (doc.name, doc.number) {
            (Some(name), None) => Ok(PortRef::Name(name)),
            (None, Some(number)) => Ok(PortRef::Number(number)),
            (Some(_), Some(_)) => Err("port must set exactly one of name or number".to_string()),
            (None, None) => Err("port must set a name or a number".to_string()),
        }
    }
}

impl From<PortRef> for PortRefDocument {
    fn from(port: PortRef) -> Self {
        match port {
            PortRef::Name(name) => Self { name: Some(name), number: None },
            PortRef::Number(number) => Self { name: None, number: Some(number) },
        }
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRef::Name(name) => write!(f, "port {:?}", name),
            PortRef::Number(number) => write!(f, "port {}", number),
        }
    }
}
