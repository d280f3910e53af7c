mod common;

use assert_matches::assert_matches;
use chart_manifest::{
	builder::{self, ProbeSpec, SecurityProfile, UNPRIVILEGED_USER},
	labels::labels,
	ExpectedResource, RenderError, ScenarioError,
};
use common::*;
use k8s_openapi::api::core::v1::ResourceRequirements;
use rstest::rstest;
use serde_json::json;

const CONTAINER: &str = "/spec/template/spec/containers/0";

fn proxy_value(key: &str) -> String {
	format!("gatewayProxies.gatewayProxy.{key}")
}

#[test]
fn default_deployment_matches_builder() -> TestResult {
	render(&request())?.expect_typed(&builder::deployment(&proxy_spec())?)?;
	Ok(())
}

#[test]
fn image_override() -> TestResult {
	let repository = proxy_value("podTemplate.image.repository");
	let tag = proxy_value("podTemplate.image.tag");
	let pull = proxy_value("podTemplate.image.pullPolicy");
	let manifest = render_with(&[
		(repository.as_str(), "envoy-custom"),
		(tag.as_str(), "0.0.1"),
		(pull.as_str(), "Always"),
	])?;

	let mut spec = proxy_spec();
	let container = &mut spec.containers[0];
	container.image.repository = "envoy-custom".to_string();
	container.image.tag = "0.0.1".to_string();
	container.pull_policy = "Always".to_string();
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn daemon_set_with_host_port() -> TestResult {
	let deployment = proxy_value("kind.deployment");
	let host_port = proxy_value("kind.daemonSet.hostPort");
	let manifest = render_with(&[(deployment.as_str(), "null"), (host_port.as_str(), "true")])?;

	manifest.expect_absent("Deployment", NAMESPACE, GATEWAY_PROXY)?;
	let daemon_set = builder::daemon_set_from(&builder::deployment(&proxy_spec())?);
	manifest.expect_typed(&daemon_set)?;
	Ok(())
}

#[test]
fn daemon_set_without_host_port() -> TestResult {
	let deployment = proxy_value("kind.deployment");
	let host_port = proxy_value("kind.daemonSet.hostPort");
	let manifest = render_with(&[(deployment.as_str(), "null"), (host_port.as_str(), "false")])?;

	let doc = manifest.expect_present("DaemonSet", NAMESPACE, GATEWAY_PROXY)?;
	assert_eq!(doc.pointer("/spec/template/spec/hostNetwork"), None);
	assert_eq!(doc.pointer(&format!("{CONTAINER}/ports/0/hostPort")), None);
	Ok(())
}

#[rstest]
#[case::net_bind_disabled(
	&[("podTemplate.disableNetBind", "true")],
	json!({"capabilities": {"drop": ["ALL"]}, "readOnlyRootFilesystem": true, "allowPrivilegeEscalation": false})
)]
#[case::unprivileged(
	&[("podTemplate.runUnprivileged", "true")],
	json!({
		"capabilities": {"add": ["NET_BIND_SERVICE"], "drop": ["ALL"]},
		"readOnlyRootFilesystem": true,
		"allowPrivilegeEscalation": false,
		"runAsNonRoot": true,
		"runAsUser": UNPRIVILEGED_USER
	})
)]
fn security_context_variants(
	#[case] overrides: &[(&str, &str)],
	#[case] security: serde_json::Value,
) -> TestResult {
	let keys: Vec<(String, &str)> = overrides
		.iter()
		.map(|(key, value)| (proxy_value(key), *value))
		.collect();
	let overrides: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), *v)).collect();
	let manifest = render_with(&overrides)?;

	let expected = ExpectedResource::typed(&builder::deployment(&proxy_spec())?)?
		.with(&format!("{CONTAINER}/securityContext"), security)?;
	manifest.expect(&expected)?;
	Ok(())
}

#[test]
fn unprivileged_without_net_bind_is_the_standard_profile() -> TestResult {
	let net_bind = proxy_value("podTemplate.disableNetBind");
	let unprivileged = proxy_value("podTemplate.runUnprivileged");
	let manifest = render_with(&[(net_bind.as_str(), "true"), (unprivileged.as_str(), "true")])?;

	let mut spec = proxy_spec();
	spec.containers[0].security = SecurityProfile::Standard;
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn probes() -> TestResult {
	let key = proxy_value("podTemplate.probes");
	let manifest = render_with(&[(key.as_str(), "true")])?;

	let command = |path: &str| -> Vec<String> {
		["wget", "-O", "/dev/null", &format!("localhost:19000/{path}")]
			.map(str::to_string)
			.to_vec()
	};
	let mut spec = proxy_spec();
	spec.containers[0].probes = Some(ProbeSpec::Exec {
		readiness: command("ready"),
		liveness: command("server_info"),
	});
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn resource_limits_compare_numerically() -> TestResult {
	let cpu = proxy_value("podTemplate.resources.limits.cpu");
	let memory = proxy_value("podTemplate.resources.limits.memory");
	let manifest = render_with(&[(cpu.as_str(), "2"), (memory.as_str(), "512Mi")])?;

	// the chart writes `cpu: 2` as a number, the builder as the string "2"
	let mut spec = proxy_spec();
	spec.containers[0].resources = Some(ResourceRequirements {
		limits: Some(quantities(&[("cpu", "2"), ("memory", "512Mi")])),
		..Default::default()
	});
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn anti_affinity() -> TestResult {
	let key = proxy_value("kind.deployment.antiAffinity");
	let manifest = render_with(&[(key.as_str(), "true")])?;

	let expected = ExpectedResource::typed(&builder::deployment(&proxy_spec())?)?.with(
		"/spec/template/spec/affinity",
		json!({
			"podAntiAffinity": {
				"preferredDuringSchedulingIgnoredDuringExecution": [{
					"weight": 100,
					"podAffinityTerm": {
						"topologyKey": "kubernetes.io/hostname",
						"labelSelector": {"matchLabels": {"gloo": "gateway-proxy"}}
					}
				}]
			}
		}),
	)?;
	manifest.expect(&expected)?;
	Ok(())
}

#[test]
fn read_config_annotations() -> TestResult {
	let key = proxy_value("readConfig");
	let manifest = render_with(&[(key.as_str(), "true")])?;

	let mut spec = proxy_spec();
	spec.annotations.extend(labels([
		("readconfig-stats", "/stats"),
		("readconfig-ready", "/ready"),
		("readconfig-config_dump", "/config_dump"),
		("readconfig-port", "8082"),
	]));
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn sidecar_containers_from_helper() -> TestResult {
	let key = proxy_value("extraContainersHelper");
	let manifest = render_with(&[(key.as_str(), "gloo.testcontainer")])?;

	let mut spec = proxy_spec();
	spec.containers[0]
		.volume_mounts
		.push(mount("shared-data", "/usr/share/shared-data"));
	spec.volumes
		.push(volume(json!({"name": "shared-data", "emptyDir": {}})));
	let expected = ExpectedResource::typed(&builder::deployment(&spec)?)?.with(
		"/spec/template/spec/containers/1",
		json!({"name": "nginx", "image": "nginx:1.7.9", "ports": [{"containerPort": 80}]}),
	)?;
	manifest.expect(&expected)?;

	// an empty emptyDir is still the volume's whole source
	let sourceless = expected.without("/spec/template/spec/volumes/1/emptyDir");
	let err = manifest.expect(&sourceless).unwrap_err();
	assert!(
		err.to_string()
			.contains("spec.template.spec.volumes[1].emptyDir: expected <absent>, found {}"),
		"{err}"
	);
	Ok(())
}

#[test]
fn unknown_sidecar_helper_fails_the_render() {
	let key = proxy_value("extraContainersHelper");
	assert_matches!(
		render_with(&[(key.as_str(), "gloo.missing")]),
		Err(ScenarioError::Render(RenderError::Template { message })) if message.contains(r#"no template "gloo.missing""#)
	);
}

#[test]
fn replicas() -> TestResult {
	let key = proxy_value("kind.deployment.replicas");
	let manifest = render_with(&[(key.as_str(), "2")])?;
	let spec = chart_manifest::BuilderSpec {
		replicas: 2,
		..proxy_spec()
	};
	manifest.expect_typed(&builder::deployment(&spec)?)?;
	Ok(())
}

#[test]
fn default_service_matches_builder() -> TestResult {
	render(&request())?.expect_typed(&builder::service(&proxy_service_spec())?)?;
	Ok(())
}

#[test]
fn service_extra_annotations() -> TestResult {
	let key = proxy_value("service.extraAnnotations.test");
	let manifest = render_with(&[(key.as_str(), "test")])?;

	let mut spec = proxy_service_spec();
	spec.annotations = labels([("test", "test")]);
	manifest.expect_typed(&builder::service(&spec)?)?;
	Ok(())
}

#[rstest]
#[case::external_traffic_policy("service.externalTrafficPolicy", "Local", "externalTrafficPolicy")]
#[case::cluster_ip("service.clusterIP", "None", "clusterIP")]
#[case::load_balancer_ip("service.loadBalancerIP", "130.211.204.1", "loadBalancerIP")]
fn service_fields(#[case] value_key: &str, #[case] value: &str, #[case] field: &str) -> TestResult {
	let key = proxy_value(value_key);
	let manifest = render_with(&[(key.as_str(), value)])?;

	let expected = ExpectedResource::typed(&builder::service(&proxy_service_spec())?)?
		.with(&format!("/spec/{field}"), json!(value))?;
	manifest.expect(&expected)?;
	Ok(())
}

#[test]
fn cluster_ip_service() -> TestResult {
	let service_type = proxy_value("service.type");
	let cluster_ip = proxy_value("service.clusterIP");
	let manifest = render_with(&[
		(service_type.as_str(), "ClusterIP"),
		(cluster_ip.as_str(), "None"),
	])?;

	let mut spec = proxy_service_spec();
	spec.service.service_type = Some("ClusterIP".to_string());
	let expected =
		ExpectedResource::typed(&builder::service(&spec)?)?.with("/spec/clusterIP", json!("None"))?;
	manifest.expect(&expected)?;
	Ok(())
}

#[test]
fn extra_proxies_inherit_defaults() -> TestResult {
	let manifest = render_with(&[("gatewayProxies.publicGw.podTemplate.httpPort", "9090")])?;

	let doc = manifest.expect_present("Deployment", NAMESPACE, "public-gw")?;
	assert_eq!(doc.label("gateway-proxy-id"), Some("public-gw"));
	assert_eq!(
		doc.pointer(&format!("{CONTAINER}/ports/0/containerPort")),
		Some(&json!(9090))
	);
	assert_eq!(
		doc.pointer(&format!("{CONTAINER}/ports/1/containerPort")),
		Some(&json!(8443))
	);

	let service = manifest.expect_present("Service", NAMESPACE, "public-gw")?;
	assert_eq!(service.pointer("/spec/ports/0/targetPort"), Some(&json!(9090)));
	manifest.expect_present("ConfigMap", NAMESPACE, "public-gw-envoy-config")?;
	manifest.expect_present("Gateway", NAMESPACE, "public-gw")?;
	manifest.expect_present("Gateway", NAMESPACE, "public-gw-ssl")?;

	// the default proxy is unchanged
	manifest.expect_typed(&builder::deployment(&proxy_spec())?)?;
	Ok(())
}

#[test]
fn disabled_proxy_is_absent() -> TestResult {
	let key = proxy_value("disabled");
	let manifest = render_with(&[(key.as_str(), "true")])?;

	for kind in ["Deployment", "Service", "Gateway"] {
		manifest.expect_absent(kind, NAMESPACE, GATEWAY_PROXY)?;
	}
	manifest.expect_absent("ConfigMap", NAMESPACE, "gateway-proxy-envoy-config")?;
	manifest.expect_absent("ServiceAccount", NAMESPACE, GATEWAY_PROXY)?;
	Ok(())
}
