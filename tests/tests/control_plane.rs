mod common;

use chart_manifest::{
	builder::{self, BuilderSpec, PortSpec, ServiceSpec, DEFAULT_PULL_POLICY, DEFAULT_REGISTRY},
	gateway::Settings,
	ExpectedResource,
};
use common::*;
use rstest::rstest;
use serde_json::json;

const PUBLIC_REGISTRY: &str = "gcr.io/solo-public";

#[rstest]
#[case::gloo(gloo_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY))]
#[case::discovery(discovery_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY))]
#[case::gateway(gateway_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY))]
fn deployments_match_builder_defaults(#[case] spec: BuilderSpec) -> TestResult {
	let manifest = render(&request())?;
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[rstest]
#[case::gloo(gloo_spec(PUBLIC_REGISTRY, "Always"))]
#[case::discovery(discovery_spec(PUBLIC_REGISTRY, "Always"))]
#[case::gateway(gateway_spec(PUBLIC_REGISTRY, "Always"))]
fn image_overrides_reach_every_workload(#[case] spec: BuilderSpec) -> TestResult {
	let manifest = render_with(&[
		("global.image.registry", PUBLIC_REGISTRY),
		("global.image.pullPolicy", "Always"),
	])?;

	let doc = manifest.expect_typed(&builder::deployment(&spec)?)?;
	let repository = &spec.containers[0].image.repository;
	assert_eq!(
		doc.pointer("/spec/template/spec/containers/0/image"),
		Some(&json!(format!("{PUBLIC_REGISTRY}/{repository}:{VERSION}")))
	);
	Ok(())
}

#[test]
fn component_image_settings_win_over_global_ones() -> TestResult {
	let manifest = render_with(&[
		("global.image.registry", PUBLIC_REGISTRY),
		("gloo.deployment.image.registry", "registry.example.com"),
		("gloo.deployment.image.tag", "dev"),
	])?;

	let mut spec = gloo_spec("registry.example.com", DEFAULT_PULL_POLICY);
	spec.containers[0].image.tag = "dev".to_string();
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn gloo_service_matches_builder_defaults() -> TestResult {
	let spec = BuilderSpec {
		labels: component_labels("gloo"),
		global_labels: installation_labels(),
		service: ServiceSpec {
			ports: vec![
				PortSpec::new("grpc-xds", 9977),
				PortSpec::new("grpc-validation", 9988),
			],
			service_type: None,
		},
		..BuilderSpec::new(NAMESPACE, "gloo")
	};
	render(&request())?.expect_typed(&builder::service(&spec)?)?;
	Ok(())
}

#[test]
fn usage_statistics_can_be_disabled() -> TestResult {
	let manifest = render_with(&[("gloo.deployment.disableUsageStatistics", "true")])?;

	let mut spec = gloo_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY);
	spec.containers[0]
		.env
		.push(builder::env_var("DISABLE_USAGE_REPORTING", "true"));
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn stats_can_be_turned_off() -> TestResult {
	let manifest = render_with(&[("discovery.deployment.stats", "false")])?;

	let mut spec = discovery_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY);
	spec.annotations.clear();
	spec.containers[0].env.truncate(1);
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn replicas_are_configurable() -> TestResult {
	let manifest = render_with(&[("gateway.deployment.replicas", "3")])?;
	let spec = BuilderSpec {
		replicas: 3,
		..gateway_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY)
	};
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn disabled_discovery_is_absent() -> TestResult {
	let manifest = render_with(&[("discovery.enabled", "false")])?;

	manifest.expect_absent("Deployment", NAMESPACE, "discovery")?;
	manifest.expect_absent("ServiceAccount", NAMESPACE, "discovery")?;
	let settings = manifest.expect_custom_resource::<Settings>(NAMESPACE, "default")?;
	assert_eq!(settings.spec.discovery, Some(json!({"fdsMode": "DISABLED"})));
	Ok(())
}

#[test]
fn gateway_without_validation() -> TestResult {
	let manifest = render_with(&[("gateway.validation.enabled", "false")])?;

	let mut container = gateway_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY).containers[0].clone();
	container.env.truncate(2);
	container.ports.clear();
	container.probes = None;
	container.volume_mounts.clear();
	let spec = BuilderSpec {
		containers: vec![container],
		volumes: Vec::new(),
		..gateway_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY)
	};
	manifest.expect_typed(&builder::deployment(&spec)?)?;

	manifest.expect_absent("Service", NAMESPACE, "gateway")?;
	manifest.expect_absent("Job", NAMESPACE, "gateway-certgen")?;
	manifest.expect_absent(
		"ValidatingWebhookConfiguration",
		"",
		&format!("gloo-gateway-validation-webhook-{NAMESPACE}"),
	)?;

	let settings = manifest.expect_custom_resource::<Settings>(NAMESPACE, "default")?;
	assert_eq!(settings.spec.proxy_validation_server_addr, None);
	assert_eq!(settings.spec.always_accept, None);
	Ok(())
}

#[test]
fn disabled_gateway_leaves_the_control_plane() -> TestResult {
	let manifest = render_with(&[("gateway.enabled", "false")])?;

	manifest.expect_absent("Deployment", NAMESPACE, "gateway")?;
	manifest.expect_absent("Gateway", NAMESPACE, GATEWAY_PROXY)?;
	manifest.expect_typed(&builder::deployment(&gloo_spec(DEFAULT_REGISTRY, DEFAULT_PULL_POLICY))?)?;
	// proxies still run without generated gateways
	manifest.expect_present("Deployment", NAMESPACE, GATEWAY_PROXY)?;
	Ok(())
}

#[test]
fn patched_expectation_reports_the_changed_field() -> TestResult {
	let manifest = render_with(&[("gloo.deployment.xdsPort", "9999")])?;
	let expected = ExpectedResource::typed(&builder::deployment(&gloo_spec(
		DEFAULT_REGISTRY,
		DEFAULT_PULL_POLICY,
	))?)?;

	let err = manifest.expect(&expected).unwrap_err();
	let message = err.to_string();
	assert!(
		message.contains("spec.template.spec.containers[0].ports[0].containerPort: expected 9977, found 9999"),
		"{message}"
	);
	assert!(
		message.contains("spec.template.spec.containers[0].readinessProbe.tcpSocket.port"),
		"{message}"
	);

	let patched = expected
		.with("/spec/template/spec/containers/0/ports/0/containerPort", json!(9999))?
		.with(
			"/spec/template/spec/containers/0/readinessProbe/tcpSocket/port",
			json!(9999),
		)?;
	manifest.expect(&patched)?;
	Ok(())
}
