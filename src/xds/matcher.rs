//! Route match compilation
//!
//! Turns the declarative path, header and traffic-fraction criteria of a
//! [`RouteSpec`] into a [`CompiledRouteMatch`]. The compiled form is both the
//! source of the Envoy `RouteMatch` and an evaluator that tooling and tests
//! use to check which requests a route would capture.

use std::collections::HashMap;

use envoy_types::pb::envoy::config::core::v3::RuntimeFractionalPercent;
use envoy_types::pb::envoy::config::route::v3::{
    header_matcher::HeaderMatchSpecifier, route_match::PathSpecifier,
    HeaderMatcher as EnvoyHeaderMatcher, RouteMatch,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{
    regex_matcher::{EngineType, GoogleRe2},
    string_matcher::MatchPattern,
    RegexMatcher, StringMatcher,
};
use envoy_types::pb::envoy::r#type::v3::{fractional_percent, FractionalPercent, Int64Range};
use envoy_types::pb::google::protobuf::BoolValue;
use regex::Regex;

use crate::domain::{
    HeaderMatcherSpec, PathMatcherSpec, RegexMatcherSpec, RouteSpec, RuntimeFractionSpec,
    DEFAULT_REGEX_ENGINE,
};
use crate::errors::{Error, Result};

/// A validated regular expression together with its source text.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    source: String,
    anchored: Regex,
}

impl CompiledRegex {
    pub fn compile(spec: &RegexMatcherSpec) -> Result<Self> {
        if spec.engine != DEFAULT_REGEX_ENGINE {
            return Err(Error::config(format!(
                "unsupported regex engine {:?}, only {:?} is supported",
                spec.engine, DEFAULT_REGEX_ENGINE
            )));
        }
        if spec.regex.is_empty() {
            return Err(Error::config("regex must not be empty"));
        }

        // RE2 matchers in Envoy must match the whole value.
        let anchored = Regex::new(&format!("^(?:{})$", spec.regex))
            .map_err(|e| Error::config(format!("invalid regex {:?}: {}", spec.regex, e)))?;

        Ok(Self { source: spec.regex.clone(), anchored })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.anchored.is_match(value)
    }

    #[allow(deprecated)]
    fn to_envoy(&self) -> RegexMatcher {
        RegexMatcher {
            engine_type: Some(EngineType::GoogleRe2(GoogleRe2::default())),
            regex: self.source.clone(),
        }
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Path criterion after precedence has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum PathMatcher {
    Prefix(String),
    Exact(String),
    Regex(CompiledRegex),
}

impl PathMatcher {
    /// Regex wins over a non-empty exact path, which wins over the prefix.
    pub fn compile(spec: &PathMatcherSpec) -> Result<Self> {
        if let Some(regex) = &spec.regex {
            return Ok(PathMatcher::Regex(CompiledRegex::compile(regex)?));
        }
        if let Some(path) = spec.path.as_ref().filter(|p| !p.is_empty()) {
            return Ok(PathMatcher::Exact(path.clone()));
        }
        let prefix = spec.prefix.as_ref().filter(|p| !p.is_empty()).cloned();
        Ok(PathMatcher::Prefix(prefix.unwrap_or_else(|| "/".to_string())))
    }

    pub fn matches(&self, path: &str, case_sensitive: bool) -> bool {
        match self {
            PathMatcher::Prefix(prefix) if case_sensitive => path.starts_with(prefix.as_str()),
            PathMatcher::Prefix(prefix) => path
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            PathMatcher::Exact(exact) if case_sensitive => path == exact,
            PathMatcher::Exact(exact) => path.eq_ignore_ascii_case(exact),
            PathMatcher::Regex(regex) => regex.is_match(path),
        }
    }

    fn to_envoy(&self) -> PathSpecifier {
        match self {
            PathMatcher::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
            PathMatcher::Exact(exact) => PathSpecifier::Path(exact.clone()),
            PathMatcher::Regex(regex) => PathSpecifier::SafeRegex(regex.to_envoy()),
        }
    }
}

/// The single criterion of a header matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderMatchKind {
    Exact(String),
    Regex(CompiledRegex),
    /// Half-open `[start, end)` over the header parsed as an integer
    Range { start: i64, end: i64 },
    Present(bool),
    Prefix(String),
    Suffix(String),
}

impl HeaderMatchKind {
    fn label(&self) -> &'static str {
        match self {
            HeaderMatchKind::Exact(_) => "exact",
            HeaderMatchKind::Regex(_) => "regex",
            HeaderMatchKind::Range { .. } => "range",
            HeaderMatchKind::Present(_) => "present",
            HeaderMatchKind::Prefix(_) => "prefix",
            HeaderMatchKind::Suffix(_) => "suffix",
        }
    }

    fn matches_value(&self, value: &str) -> bool {
        match self {
            HeaderMatchKind::Exact(exact) => value == exact,
            HeaderMatchKind::Regex(regex) => regex.is_match(value),
            HeaderMatchKind::Range { start, end } => value
                .trim()
                .parse::<i64>()
                .map(|v| v >= *start && v < *end)
                .unwrap_or(false),
            HeaderMatchKind::Present(expected) => *expected,
            HeaderMatchKind::Prefix(prefix) => value.starts_with(prefix.as_str()),
            HeaderMatchKind::Suffix(suffix) => value.ends_with(suffix.as_str()),
        }
    }
}

/// Compiled header criterion. The name is stored lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatcher {
    pub name: String,
    pub kind: HeaderMatchKind,
    pub invert: bool,
}

impl HeaderMatcher {
    pub fn compile(spec: &HeaderMatcherSpec) -> Result<Self> {
        let name = spec.name.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::config("header matcher requires a header name"));
        }

        let mut kinds = Vec::new();
        if let Some(exact) = &spec.exact {
            kinds.push(HeaderMatchKind::Exact(exact.clone()));
        }
        if let Some(regex) = &spec.regex {
            kinds.push(HeaderMatchKind::Regex(CompiledRegex::compile(regex)?));
        }
        if let Some(range) = &spec.range {
            kinds.push(HeaderMatchKind::Range { start: range.start, end: range.end });
        }
        if let Some(present) = spec.present {
            kinds.push(HeaderMatchKind::Present(present));
        }
        if let Some(prefix) = &spec.prefix {
            kinds.push(HeaderMatchKind::Prefix(prefix.clone()));
        }
        if let Some(suffix) = &spec.suffix {
            kinds.push(HeaderMatchKind::Suffix(suffix.clone()));
        }

        if kinds.len() != 1 {
            let found: Vec<&str> = kinds.iter().map(HeaderMatchKind::label).collect();
            return Err(Error::config(format!(
                "invalid header matcher for {:?}: exactly one of exact, regex, range, present, \
                 prefix, suffix must be set (found [{}])",
                name,
                found.join(", ")
            )));
        }

        let kind = kinds.remove(0);
        Ok(Self { name, kind, invert: spec.invert })
    }

    /// Evaluate against request headers. An absent header only satisfies a
    /// presence check; every other kind fails regardless of `invert`.
    pub fn matches(&self, request: &RequestAttributes) -> bool {
        match (request.header(&self.name), &self.kind) {
            (None, HeaderMatchKind::Present(expected)) => !*expected != self.invert,
            (None, _) => false,
            (Some(value), kind) => kind.matches_value(value) != self.invert,
        }
    }

    fn to_envoy(&self) -> EnvoyHeaderMatcher {
        let specifier = match &self.kind {
            HeaderMatchKind::Exact(exact) => string_match(MatchPattern::Exact(exact.clone())),
            HeaderMatchKind::Regex(regex) => {
                string_match(MatchPattern::SafeRegex(regex.to_envoy()))
            }
            HeaderMatchKind::Range { start, end } => {
                HeaderMatchSpecifier::RangeMatch(Int64Range { start: *start, end: *end })
            }
            HeaderMatchKind::Present(present) => HeaderMatchSpecifier::PresentMatch(*present),
            HeaderMatchKind::Prefix(prefix) => string_match(MatchPattern::Prefix(prefix.clone())),
            HeaderMatchKind::Suffix(suffix) => string_match(MatchPattern::Suffix(suffix.clone())),
        };

        EnvoyHeaderMatcher {
            name: self.name.clone(),
            header_match_specifier: Some(specifier),
            invert_match: self.invert,
            ..Default::default()
        }
    }
}

fn string_match(pattern: MatchPattern) -> HeaderMatchSpecifier {
    HeaderMatchSpecifier::StringMatch(StringMatcher {
        match_pattern: Some(pattern),
        ..Default::default()
    })
}

/// Denominator classes accepted for traffic-fraction gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractionDenominator {
    Hundred,
    TenThousand,
    Million,
}

impl FractionDenominator {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_uppercase().as_str() {
            "HUNDRED" => Ok(Self::Hundred),
            "TEN_THOUSAND" => Ok(Self::TenThousand),
            "MILLION" => Ok(Self::Million),
            other => Err(Error::config(format!(
                "unknown fraction denominator {:?}, expected HUNDRED, TEN_THOUSAND or MILLION",
                other
            ))),
        }
    }

    pub fn value(&self) -> u32 {
        match self {
            Self::Hundred => 100,
            Self::TenThousand => 10_000,
            Self::Million => 1_000_000,
        }
    }

    fn to_proto_value(self) -> i32 {
        match self {
            Self::Hundred => fractional_percent::DenominatorType::Hundred as i32,
            Self::TenThousand => fractional_percent::DenominatorType::TenThousand as i32,
            Self::Million => fractional_percent::DenominatorType::Million as i32,
        }
    }
}

/// Traffic-fraction gate. The numerator is kept as given; the proxy clamps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFraction {
    pub numerator: u32,
    pub denominator: FractionDenominator,
}

impl RuntimeFraction {
    pub fn compile(spec: &RuntimeFractionSpec) -> Result<Self> {
        Ok(Self {
            numerator: spec.numerator,
            denominator: FractionDenominator::parse(&spec.denominator)?,
        })
    }

    /// `sample` is drawn uniformly from `[0, denominator)`.
    pub fn admits(&self, sample: u32) -> bool {
        sample < self.numerator
    }

    fn to_envoy(&self) -> RuntimeFractionalPercent {
        RuntimeFractionalPercent {
            runtime_key: String::new(),
            default_value: Some(FractionalPercent {
                numerator: self.numerator,
                denominator: self.denominator.to_proto_value(),
            }),
        }
    }
}

/// Request view used to evaluate compiled matchers.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    pub path: String,
    headers: HashMap<String, String>,
}

impl RequestAttributes {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), headers: HashMap::new() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// All match criteria of one route.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRouteMatch {
    pub path: PathMatcher,
    pub case_sensitive: bool,
    pub headers: Vec<HeaderMatcher>,
    pub runtime_fraction: Option<RuntimeFraction>,
}

impl CompiledRouteMatch {
    pub fn compile(route: &RouteSpec) -> Result<Self> {
        let path = PathMatcher::compile(&route.path)?;
        let headers =
            route.headers.iter().map(HeaderMatcher::compile).collect::<Result<Vec<_>>>()?;
        let runtime_fraction =
            route.runtime_fraction.as_ref().map(RuntimeFraction::compile).transpose()?;

        Ok(Self { path, case_sensitive: route.case_sensitive, headers, runtime_fraction })
    }

    /// Path first, then every header matcher. The fraction gate is evaluated
    /// separately with [`RuntimeFraction::admits`].
    pub fn matches(&self, request: &RequestAttributes) -> bool {
        self.path.matches(&request.path, self.case_sensitive)
            && self.headers.iter().all(|h| h.matches(request))
    }

    pub fn to_envoy(&self) -> RouteMatch {
        RouteMatch {
            path_specifier: Some(self.path.to_envoy()),
            case_sensitive: Some(BoolValue { value: self.case_sensitive }),
            headers: self.headers.iter().map(HeaderMatcher::to_envoy).collect(),
            runtime_fraction: self.runtime_fraction.as_ref().map(RuntimeFraction::to_envoy),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RangeSpec;

    fn route_with_path(path: PathMatcherSpec) -> RouteSpec {
        RouteSpec::to_cluster("default").with_path(path)
    }

    #[test]
    fn regex_takes_precedence_over_prefix_and_exact() {
        let path = PathMatcherSpec {
            prefix: Some("/".into()),
            path: Some("/echo.Echo/Echo".into()),
            regex: Some(RegexMatcherSpec::re2(".*/EchoPremium")),
        };
        let compiled = CompiledRouteMatch::compile(&route_with_path(path)).expect("compiles");

        assert!(matches!(compiled.path, PathMatcher::Regex(_)));
        assert!(compiled.matches(&RequestAttributes::new("/echo.Echo/EchoPremium")));
        assert!(!compiled.matches(&RequestAttributes::new("/echo.Echo/Echo")));
    }

    #[test]
    fn exact_wins_over_prefix_and_empty_exact_is_ignored() {
        let exact = PathMatcher::compile(&PathMatcherSpec {
            prefix: Some("/a".into()),
            path: Some("/a/b".into()),
            regex: None,
        })
        .expect("compiles");
        assert_eq!(exact, PathMatcher::Exact("/a/b".into()));

        let prefix = PathMatcher::compile(&PathMatcherSpec {
            prefix: Some("/a".into()),
            path: Some(String::new()),
            regex: None,
        })
        .expect("compiles");
        assert_eq!(prefix, PathMatcher::Prefix("/a".into()));
    }

    #[test]
    fn prefix_defaults_to_root() {
        let path = PathMatcher::compile(&PathMatcherSpec::default()).expect("compiles");
        assert_eq!(path, PathMatcher::Prefix("/".into()));
        assert!(path.matches("/anything", true));
    }

    #[test]
    fn unsupported_engine_is_rejected() {
        let spec = RegexMatcherSpec { regex: ".*".into(), engine: "pcre".into() };
        let err = CompiledRegex::compile(&spec).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("pcre"));
    }

    #[test]
    fn empty_and_invalid_regex_are_config_errors() {
        let empty = CompiledRegex::compile(&RegexMatcherSpec::re2(""));
        assert!(matches!(empty, Err(Error::Config(_))));
        let spaces = CompiledRegex::compile(&RegexMatcherSpec::re2(" ")).expect("compiles");
        assert!(spaces.is_match(" "));
        let unclosed = CompiledRegex::compile(&RegexMatcherSpec::re2("(unclosed"));
        assert!(matches!(unclosed, Err(Error::Config(_))));
    }

    #[test]
    fn case_insensitive_prefix_and_exact() {
        let route = route_with_path(PathMatcherSpec::prefix("/echo.Echo/")).case_sensitive(false);
        let compiled = CompiledRouteMatch::compile(&route).expect("compiles");
        assert!(compiled.matches(&RequestAttributes::new("/ECHO.echo/Echo")));
        assert!(!compiled.matches(&RequestAttributes::new("/ech")));

        let sensitive_prefix = route_with_path(PathMatcherSpec::prefix("/echo.Echo/"));
        let sensitive = CompiledRouteMatch::compile(&sensitive_prefix).expect("compiles");
        assert!(sensitive.matches(&RequestAttributes::new("/echo.Echo/Echo")));
        assert!(!sensitive.matches(&RequestAttributes::new("/echo.echo/Echo")));

        let unicode = route_with_path(PathMatcherSpec::prefix("/straße")).case_sensitive(false);
        let unicode = CompiledRouteMatch::compile(&unicode).expect("compiles");
        assert!(unicode.matches(&RequestAttributes::new("/STRAßE/x")));
        assert!(!unicode.matches(&RequestAttributes::new("/STRASSE/x")));

        let exact = route_with_path(PathMatcherSpec::exact("/a/B"));
        let sensitive = CompiledRouteMatch::compile(&exact).expect("compiles");
        assert!(!sensitive.matches(&RequestAttributes::new("/a/b")));

        let insensitive =
            CompiledRouteMatch::compile(&exact.case_sensitive(false)).expect("compiles");
        assert!(insensitive.matches(&RequestAttributes::new("/a/b")));
        assert_eq!(insensitive.to_envoy().case_sensitive, Some(BoolValue { value: false }));
    }

    #[test]
    fn header_matcher_requires_exactly_one_kind() {
        let none = HeaderMatcherSpec { name: "x-variant".into(), ..Default::default() };
        assert!(matches!(HeaderMatcher::compile(&none), Err(Error::Config(_))));

        let two = HeaderMatcherSpec {
            name: "x-variant".into(),
            exact: Some("a".into()),
            prefix: Some("a".into()),
            ..Default::default()
        };
        let err = HeaderMatcher::compile(&two).unwrap_err();
        assert!(err.to_string().contains("exact, prefix"));
    }

    #[test]
    fn header_names_are_lowercased() {
        let matcher = HeaderMatcher::compile(&HeaderMatcherSpec::exact("X-Variant", "Awesome"))
            .expect("compiles");
        assert_eq!(matcher.name, "x-variant");
        assert!(matcher.matches(&RequestAttributes::new("/").with_header("X-VARIANT", "Awesome")));
        assert!(!matcher.matches(&RequestAttributes::new("/").with_header("x-variant", "awesome")));
    }

    #[test]
    fn header_kinds_evaluate() {
        let request = RequestAttributes::new("/")
            .with_header("x-build", "1024")
            .with_header("x-env", "prod-eu");

        let range = HeaderMatcher::compile(&HeaderMatcherSpec {
            name: "x-build".into(),
            range: Some(RangeSpec { start: 1000, end: 1024 }),
            ..Default::default()
        })
        .expect("compiles");
        assert!(!range.matches(&request), "range end is exclusive");

        let regex = HeaderMatcher::compile(&HeaderMatcherSpec {
            name: "x-env".into(),
            regex: Some(RegexMatcherSpec::re2("prod-.*")),
            ..Default::default()
        })
        .expect("compiles");
        assert!(regex.matches(&request));

        for spec in [
            HeaderMatcherSpec::prefix("x-env", "prod"),
            HeaderMatcherSpec::suffix("x-env", "-eu"),
            HeaderMatcherSpec::present("x-env"),
        ] {
            let matcher = HeaderMatcher::compile(&spec).expect("compiles");
            assert!(matcher.matches(&request), "{:?}", matcher.kind);
        }
    }

    #[test]
    fn invert_negates_but_absent_header_still_fails() {
        let inverted =
            HeaderMatcher::compile(&HeaderMatcherSpec::exact("x-variant", "Awesome").inverted())
                .expect("compiles");

        assert!(inverted.matches(&RequestAttributes::new("/").with_header("x-variant", "Boring")));
        let awesome = RequestAttributes::new("/").with_header("x-variant", "Awesome");
        assert!(!inverted.matches(&awesome));
        assert!(!inverted.matches(&RequestAttributes::new("/")));

        let not_present = HeaderMatcher::compile(&HeaderMatcherSpec::present("x-debug").inverted())
            .expect("compiles");
        assert!(not_present.matches(&RequestAttributes::new("/")));
        assert!(!not_present.matches(&RequestAttributes::new("/").with_header("x-debug", "1")));
    }

    #[test]
    fn header_matchers_are_anded() {
        let route = RouteSpec::to_cluster("default")
            .with_header(HeaderMatcherSpec::exact("x-variant", "Awesome"))
            .with_header(HeaderMatcherSpec::present("x-user"));
        let compiled = CompiledRouteMatch::compile(&route).expect("compiles");

        let partial = RequestAttributes::new("/").with_header("x-variant", "Awesome");
        assert!(!compiled.matches(&partial));
        assert!(compiled.matches(&partial.with_header("x-user", "a")));
    }

    #[test]
    fn fraction_denominator_is_case_insensitive() {
        assert_eq!(
            FractionDenominator::parse("ten_thousand").expect("parses"),
            FractionDenominator::TenThousand
        );
        assert_eq!(FractionDenominator::parse("Million").expect("parses").value(), 1_000_000);
        assert!(matches!(FractionDenominator::parse("THOUSAND"), Err(Error::Config(_))));
    }

    #[test]
    fn fraction_admits_below_numerator() {
        let spec = RuntimeFractionSpec { numerator: 25, denominator: "HUNDRED".into() };
        let fraction = RuntimeFraction::compile(&spec).expect("compiles");
        assert!(fraction.admits(0));
        assert!(fraction.admits(24));
        assert!(!fraction.admits(25));

        let envoy = fraction.to_envoy();
        let default_value = envoy.default_value.expect("default value");
        assert_eq!(default_value.numerator, 25);
        assert_eq!(default_value.denominator, fractional_percent::DenominatorType::Hundred as i32);
    }

    #[test]
    fn envoy_route_match_carries_headers_and_fraction() {
        let mut route = RouteSpec::to_cluster("default")
            .with_path(PathMatcherSpec::regex(".*/EchoPremium"))
            .with_header(HeaderMatcherSpec::exact("x-variant", "Awesome").inverted());
        route.runtime_fraction =
            Some(RuntimeFractionSpec { numerator: 5, denominator: "million".into() });

        let envoy = CompiledRouteMatch::compile(&route).expect("compiles").to_envoy();

        match envoy.path_specifier {
            Some(PathSpecifier::SafeRegex(regex)) => {
                assert_eq!(regex.regex, ".*/EchoPremium");
                #[allow(deprecated)]
                let google_re2 = matches!(regex.engine_type, Some(EngineType::GoogleRe2(_)));
                assert!(google_re2, "regex matcher names its engine");
            }
            other => panic!("unexpected path specifier: {:?}", other),
        }
        assert_eq!(envoy.headers.len(), 1);
        assert!(envoy.headers[0].invert_match);
        match &envoy.headers[0].header_match_specifier {
            Some(HeaderMatchSpecifier::StringMatch(StringMatcher {
                match_pattern: Some(MatchPattern::Exact(v)),
                ..
            })) => assert_eq!(v, "Awesome"),
            other => panic!("unexpected header specifier: {:?}", other),
        }
        let fraction = envoy.runtime_fraction.and_then(|f| f.default_value).expect("fraction");
        assert_eq!(fraction.denominator, fractional_percent::DenominatorType::Million as i32);
    }
}
