//! Integration tests for bundle synthesis
//!
//! Every test builds routing specs and membership, runs them through the
//! public synthesis API and inspects the encoded Envoy resources.

mod common;

use std::sync::Arc;

use envoy_types::pb::envoy::config::route::v3::route_match::PathSpecifier;
use routeforge::domain::{
    ClusterRef, ClusterSpec, HeaderMatcherSpec, Locality, Membership, MembershipIndex,
    PathMatcherSpec, PortRef, RouteSpec, RoutingSpec, ServiceRef,
};
use routeforge::xds::{synthesize_bundle, RequestAttributes};
use routeforge::{Error, InMemorySource};
use tokio_util::sync::CancellationToken;

use common::{
    grpc_service, load_assignment, route_configuration, simple_spec, socket_addresses, tally,
    TrafficSimulator,
};

fn index(memberships: Vec<Membership>) -> MembershipIndex {
    memberships.into_iter().collect()
}

fn spec_with_regex_and_prefix() -> RoutingSpec {
    RoutingSpec::new("echo", "default", "echo_server")
        .with_route(
            RouteSpec::to_cluster("premium")
                .with_path(PathMatcherSpec {
                    prefix: Some("/".to_string()),
                    regex: PathMatcherSpec::regex(".*/EchoPremium").regex,
                    ..Default::default()
                }),
        )
        .with_route(RouteSpec::to_cluster("standard"))
        .with_cluster(ClusterSpec::new(
            "premium",
            vec![Locality::service(ServiceRef::new("premium", PortRef::name("grpc")))],
        ))
        .with_cluster(ClusterSpec::new(
            "standard",
            vec![Locality::service(ServiceRef::new("standard", PortRef::name("grpc")))],
        ))
}

#[test]
fn synthesis_is_idempotent() {
    let spec = simple_spec("default", "echo", "echo_server", "echo");
    let membership = index(vec![grpc_service("default", "echo", &["10.0.0.1", "10.0.0.2"], 8080)]);

    let first = synthesize_bundle(&spec, &membership).expect("first synthesis");
    let second = synthesize_bundle(&spec, &membership).expect("second synthesis");

    assert_eq!(first, second);
    assert_eq!(first.resource_count(), 4);
}

#[test]
fn regex_path_takes_precedence_over_prefix() {
    let spec = spec_with_regex_and_prefix();
    let membership = index(vec![
        grpc_service("default", "premium", &["10.0.0.1"], 8080),
        grpc_service("default", "standard", &["10.0.0.2"], 8080),
    ]);
    let bundle = synthesize_bundle(&spec, &membership).expect("synthesizes");

    let premium = bundle
        .route_table
        .first_match(&RequestAttributes::new("/echo.Echo/EchoPremium"))
        .expect("premium request matches");
    assert_eq!(premium.targets[0].local_name, "premium");

    let standard = bundle
        .route_table
        .first_match(&RequestAttributes::new("/echo.Echo/Echo"))
        .expect("standard request matches");
    assert_eq!(standard.targets[0].local_name, "standard");

    let encoded = &bundle.route_configuration.virtual_hosts[0].routes[0];
    match encoded.r#match.as_ref().and_then(|m| m.path_specifier.as_ref()) {
        Some(PathSpecifier::SafeRegex(regex)) => assert_eq!(regex.regex, ".*/EchoPremium"),
        other => panic!("expected a regex path, got {:?}", other),
    }
}

#[test]
fn port_by_name_and_by_number_resolve_identically() {
    let membership = index(vec![grpc_service("default", "echo", &["10.0.0.1"], 8080)]);
    let by_name = simple_spec("default", "echo", "echo_server", "echo");
    let mut by_number = by_name.clone();
    by_number.clusters[0].localities[0] =
        Locality::service(ServiceRef::new("echo", PortRef::Number(8080)));

    let by_name = synthesize_bundle(&by_name, &membership).expect("by name");
    let by_number = synthesize_bundle(&by_number, &membership).expect("by number");

    assert_eq!(by_name.load_assignments, by_number.load_assignments);
    assert_eq!(
        socket_addresses(&by_name.load_assignments[0].endpoints[0]),
        vec![("10.0.0.1".to_string(), 8080)]
    );
}

#[test]
fn service_in_another_namespace_is_resolved_there() {
    let mut spec = simple_spec("frontend", "echo", "echo_server", "echo");
    spec.clusters[0].localities[0] = Locality::service(
        ServiceRef::new("echo", PortRef::name("grpc")).in_namespace("backend"),
    );
    let membership = index(vec![
        grpc_service("frontend", "echo", &["10.0.0.1"], 8080),
        grpc_service("backend", "echo", &["10.1.0.1"], 9090),
    ]);

    let bundle = synthesize_bundle(&spec, &membership).expect("synthesizes");
    assert_eq!(
        socket_addresses(&bundle.load_assignments[0].endpoints[0]),
        vec![("10.1.0.1".to_string(), 9090)]
    );
}

#[test]
fn case_insensitive_prefix_matches_any_case() {
    let mut spec = simple_spec("default", "echo", "echo_server", "echo");
    spec.routes[0] = RouteSpec::to_cluster("v1")
        .with_path(PathMatcherSpec::prefix("/Echo.Echo/"))
        .case_sensitive(false);
    let membership = index(vec![grpc_service("default", "echo", &["10.0.0.1"], 8080)]);

    let bundle = synthesize_bundle(&spec, &membership).expect("synthesizes");

    assert!(bundle.route_table.first_match(&RequestAttributes::new("/echo.echo/Echo")).is_some());
    assert!(bundle.route_table.first_match(&RequestAttributes::new("/ECHO.ECHO/Echo")).is_some());
    assert!(bundle.route_table.first_match(&RequestAttributes::new("/other/Echo")).is_none());

    let encoded = bundle.route_configuration.virtual_hosts[0].routes[0].r#match.as_ref();
    assert_eq!(encoded.and_then(|m| m.case_sensitive.as_ref()).map(|b| b.value), Some(false));

    spec.routes[0] = RouteSpec::to_cluster("v1").with_path(PathMatcherSpec::prefix("/Echo.Echo/"));
    let sensitive = synthesize_bundle(&spec, &membership).expect("synthesizes");

    let table = &sensitive.route_table;
    assert!(table.first_match(&RequestAttributes::new("/Echo.Echo/Echo")).is_some());
    assert!(table.first_match(&RequestAttributes::new("/echo.echo/Echo")).is_none());
    let encoded = sensitive.route_configuration.virtual_hosts[0].routes[0].r#match.as_ref();
    assert_eq!(encoded.and_then(|m| m.case_sensitive.as_ref()).map(|b| b.value), Some(true));
}

#[test]
fn header_matchers_select_the_first_matching_route() {
    let spec = RoutingSpec::new("echo", "default", "echo_server")
        .with_route(
            RouteSpec::to_cluster("canary")
                .with_header(HeaderMatcherSpec::exact("X-Canary", "true")),
        )
        .with_route(RouteSpec::to_cluster("stable"))
        .with_cluster(ClusterSpec::new(
            "canary",
            vec![Locality::service(ServiceRef::new("echo-canary", PortRef::name("grpc")))],
        ))
        .with_cluster(ClusterSpec::new(
            "stable",
            vec![Locality::service(ServiceRef::new("echo", PortRef::name("grpc")))],
        ));
    let membership = index(vec![
        grpc_service("default", "echo", &["10.0.0.1"], 8080),
        grpc_service("default", "echo-canary", &["10.0.0.9"], 8080),
    ]);
    let bundle = synthesize_bundle(&spec, &membership).expect("synthesizes");

    let canary = RequestAttributes::new("/echo.Echo/Echo").with_header("x-canary", "true");
    let routed = bundle.route_table.first_match(&canary).expect("canary matches");
    assert_eq!(routed.targets[0].cluster, "routeforge.echo.default.canary");

    let plain = RequestAttributes::new("/echo.Echo/Echo").with_header("x-canary", "false");
    let routed = bundle.route_table.first_match(&plain).expect("plain matches");
    assert_eq!(routed.targets[0].cluster, "routeforge.echo.default.stable");

    let encoded = &bundle.route_configuration.virtual_hosts[0].routes[0];
    let headers = &encoded.r#match.as_ref().expect("route match").headers;
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].name, "x-canary");
}

#[test]
fn missing_membership_fails_the_bundle() {
    let spec = simple_spec("default", "echo", "echo_server", "echo");
    let err = synthesize_bundle(&spec, &MembershipIndex::new()).unwrap_err();

    assert!(matches!(err, Error::Resolution(_)));
    assert!(err.to_string().contains("default/echo"));
}

#[tokio::test]
async fn weighted_split_follows_declared_weights() {
    let spec = RoutingSpec::new("echo", "default", "echo_server")
        .with_route(RouteSpec::to_cluster("v1").with_clusters(vec![
            ClusterRef::new("v1", 80),
            ClusterRef::new("v2", 20),
        ]))
        .with_cluster(ClusterSpec::new(
            "v1",
            vec![Locality::service(ServiceRef::new("echo-v1", PortRef::name("grpc")))],
        ))
        .with_cluster(ClusterSpec::new(
            "v2",
            vec![Locality::service(ServiceRef::new("echo-v2", PortRef::name("grpc")))],
        ));

    let source = Arc::new(InMemorySource::new());
    source.upsert_spec(spec);
    source.upsert_membership(grpc_service("default", "echo-v1", &["10.0.1.1", "10.0.1.2"], 8080));
    source.upsert_membership(grpc_service("default", "echo-v2", &["10.0.2.1"], 8080));

    let assembler = common::assembler(&source);
    assembler.run_pass(&CancellationToken::new()).await.expect("pass");
    let snapshot = assembler.store().current();

    let routes = route_configuration(&snapshot, "routeforge.echo.default.routeconfig");
    let route = &routes.virtual_hosts[0].routes[0];
    let v1 = load_assignment(&snapshot, "routeforge.echo.default.v1");
    let v2 = load_assignment(&snapshot, "routeforge.echo.default.v2");

    let mut simulator = TrafficSimulator::new();
    let counts = tally(10_000, || {
        let cluster = simulator.pick_cluster(route)?;
        let assignment = if cluster == v1.cluster_name { &v1 } else { &v2 };
        simulator.pick_endpoint(assignment).map(|(address, _)| address)
    });

    let v1_total = counts["10.0.1.1"] + counts["10.0.1.2"];
    let v2_total = counts["10.0.2.1"];
    assert_eq!(v1_total + v2_total, 10_000);
    assert!((7_700..=8_300).contains(&v1_total), "v1 received {}", v1_total);
    assert!((1_700..=2_300).contains(&v2_total), "v2 received {}", v2_total);
}

#[test]
fn empty_priority_zero_falls_over_to_priority_one() {
    let spec = RoutingSpec::new("echo", "default", "echo_server")
        .with_route(RouteSpec::to_cluster("v1"))
        .with_cluster(ClusterSpec::new(
            "v1",
            vec![
                Locality::service(ServiceRef::new("primary", PortRef::name("grpc"))),
                Locality::service(ServiceRef::new("fallback", PortRef::name("grpc")))
                    .with_priority(1),
            ],
        ));
    let membership = index(vec![
        Membership::new("default", "primary"),
        grpc_service("default", "fallback", &["10.9.0.1"], 8080),
    ]);

    let bundle = synthesize_bundle(&spec, &membership).expect("synthesizes");
    let assignment = &bundle.load_assignments[0];
    assert_eq!(assignment.endpoints.len(), 2);
    assert!(assignment.endpoints[0].lb_endpoints.is_empty());
    assert_eq!(assignment.endpoints[1].priority, 1);

    let mut simulator = TrafficSimulator::new();
    let counts = tally(1_000, || simulator.pick_endpoint(assignment));
    assert_eq!(counts.get(&("10.9.0.1".to_string(), 8080)), Some(&1_000));
}

#[test]
fn locality_weights_split_80_20_within_a_priority() {
    let spec = RoutingSpec::new("echo", "default", "echo_server")
        .with_route(RouteSpec::to_cluster("v1"))
        .with_cluster(ClusterSpec::new(
            "v1",
            vec![
                Locality::service(ServiceRef::new("east", PortRef::name("grpc"))).with_weight(80),
                Locality::service(ServiceRef::new("west", PortRef::name("grpc"))).with_weight(20),
            ],
        ));
    let membership = index(vec![
        grpc_service("default", "east", &["10.1.0.1"], 8080),
        grpc_service("default", "west", &["10.2.0.1"], 8080),
    ]);
    let bundle = synthesize_bundle(&spec, &membership).expect("synthesizes");

    let locality = bundle.load_assignments[0].endpoints[0].locality.as_ref();
    assert_eq!(locality.map(|l| l.sub_zone.as_str()), Some("east"));

    let mut simulator = TrafficSimulator::new();
    let counts = tally(10_000, || {
        simulator.pick_endpoint(&bundle.load_assignments[0]).map(|(address, _)| address)
    });
    assert_eq!(counts.values().sum::<usize>(), 10_000);
    assert!((7_700..=8_300).contains(&counts["10.1.0.1"]), "east received {:?}", counts);
    assert!((1_700..=2_300).contains(&counts["10.2.0.1"]), "west received {:?}", counts);
}
