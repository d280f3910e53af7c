#![allow(dead_code)]

use std::{collections::BTreeMap, path::PathBuf};

use chart_manifest::{
	builder::{
		env_var, pod_name_env, pod_namespace_env, stats_server_env, BuilderSpec,
		ContainerPortSpec, ContainerSpec, PortSpec, ProbeSpec, SecurityProfile, ServiceSpec,
	},
	labels::labels,
	render_manifest, Labels, RenderRequest, RenderedManifest, ScenarioError,
};
use chart_mock::{GatewayChart, CHART_VERSION, INSTALLATION_ID_LABEL};
use k8s_openapi::{
	api::core::v1::{ResourceRequirements, Volume, VolumeMount},
	apimachinery::pkg::api::resource::Quantity,
};
use serde_json::{json, Value};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const NAMESPACE: &str = "gloo-system";
pub const INSTALL_ID: &str = "test-install";
pub const VERSION: &str = CHART_VERSION;
pub const GATEWAY_PROXY: &str = "gateway-proxy";

/// Default request: the test namespace and a fixed installation id.
pub fn request() -> RenderRequest {
	RenderRequest::new(NAMESPACE).installation_id(INSTALL_ID)
}

/// Default request with `--set` overrides.
pub fn request_with(overrides: &[(&str, &str)]) -> RenderRequest {
	overrides
		.iter()
		.fold(request(), |request, (key, value)| request.set(*key, *value))
}

pub fn render(request: &RenderRequest) -> Result<RenderedManifest, ScenarioError> {
	render_manifest(&GatewayChart::default(), request)
}

pub fn render_with(overrides: &[(&str, &str)]) -> Result<RenderedManifest, ScenarioError> {
	render(&request_with(overrides))
}

pub fn fixture_path(name: &str) -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR"))
		.join("fixtures")
		.join(name)
}

/// `app: gloo` plus the component label.
pub fn component_labels(component: &str) -> Labels {
	labels([("app", "gloo"), ("gloo", component)])
}

pub fn installation_labels() -> Labels {
	labels([(INSTALLATION_ID_LABEL, INSTALL_ID)])
}

pub fn stats_annotations(port: u16) -> Labels {
	labels([
		("prometheus.io/path", "/metrics".to_string()),
		("prometheus.io/port", port.to_string()),
		("prometheus.io/scrape", "true".to_string()),
	])
}

pub fn volume(value: Value) -> Volume {
	serde_json::from_value(value).unwrap()
}

pub fn mount(name: &str, path: &str) -> VolumeMount {
	VolumeMount {
		name: name.to_string(),
		mount_path: path.to_string(),
		..Default::default()
	}
}

pub fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
	pairs
		.iter()
		.map(|(k, v)| ((*k).to_string(), Quantity((*v).to_string())))
		.collect()
}

/// The gloo control plane deployment, with the image in `registry`.
pub fn gloo_spec(registry: &str, pull_policy: &str) -> BuilderSpec {
	let mut container = ContainerSpec::from_registry(
		registry,
		"gloo",
		VERSION,
		vec![pod_namespace_env(), stats_server_env()],
	);
	container.pull_policy = pull_policy.to_string();
	container.ports = vec![
		ContainerPortSpec::new("grpc-xds", 9977),
		ContainerPortSpec::new("grpc-validation", 9988),
	];
	container.probes = Some(ProbeSpec::Tcp { port: 9977 });
	container.volume_mounts = vec![VolumeMount {
		read_only: Some(true),
		..mount("labels-volume", "/etc/gloo")
	}];
	container.resources = Some(ResourceRequirements {
		requests: Some(quantities(&[("cpu", "500m"), ("memory", "256Mi")])),
		..Default::default()
	});

	BuilderSpec {
		labels: component_labels("gloo"),
		global_labels: installation_labels(),
		annotations: stats_annotations(9091),
		containers: vec![container],
		volumes: vec![volume(json!({
			"name": "labels-volume",
			"downwardAPI": {
				"items": [{"path": "labels", "fieldRef": {"fieldPath": "metadata.labels"}}]
			}
		}))],
		..BuilderSpec::new(NAMESPACE, "gloo")
	}
}

pub fn discovery_spec(registry: &str, pull_policy: &str) -> BuilderSpec {
	let mut container = ContainerSpec::from_registry(
		registry,
		"discovery",
		VERSION,
		vec![pod_namespace_env(), stats_server_env()],
	);
	container.pull_policy = pull_policy.to_string();

	BuilderSpec {
		labels: component_labels("discovery"),
		global_labels: installation_labels(),
		annotations: stats_annotations(9091),
		containers: vec![container],
		..BuilderSpec::new(NAMESPACE, "discovery")
	}
}

pub fn gateway_spec(registry: &str, pull_policy: &str) -> BuilderSpec {
	let mut container = ContainerSpec::from_registry(
		registry,
		"gateway",
		VERSION,
		vec![
			pod_namespace_env(),
			stats_server_env(),
			env_var("VALIDATION_MUST_START", "true"),
		],
	);
	container.pull_policy = pull_policy.to_string();
	container.ports = vec![ContainerPortSpec::new("https", 8443)];
	container.probes = Some(ProbeSpec::Tcp { port: 8443 });
	container.volume_mounts = vec![mount("validation-certs", "/etc/gateway/validation-certs")];

	BuilderSpec {
		labels: component_labels("gateway"),
		global_labels: installation_labels(),
		annotations: stats_annotations(9091),
		containers: vec![container],
		volumes: vec![volume(json!({
			"name": "validation-certs",
			"secret": {"secretName": "gateway-validation-certs", "defaultMode": 420}
		}))],
		..BuilderSpec::new(NAMESPACE, "gateway")
	}
}

pub fn proxy_labels() -> Labels {
	labels([
		("app", "gloo"),
		("gloo", GATEWAY_PROXY),
		("gateway-proxy-id", GATEWAY_PROXY),
	])
}

/// The default gateway proxy deployment.
pub fn proxy_spec() -> BuilderSpec {
	let mut container = ContainerSpec::quay(
		"gloo-envoy-wrapper",
		VERSION,
		vec![pod_namespace_env(), pod_name_env()],
	);
	container.name = Some(GATEWAY_PROXY.to_string());
	container.args = vec!["--disable-hot-restart".to_string()];
	container.ports = vec![
		ContainerPortSpec::new("http", 8080),
		ContainerPortSpec::new("https", 8443),
	];
	container.security = SecurityProfile::NetBind;
	container.volume_mounts = vec![mount("envoy-config", "/etc/envoy")];

	BuilderSpec {
		labels: proxy_labels(),
		global_labels: installation_labels(),
		pod_labels: labels([("gateway-proxy", "live")]),
		annotations: stats_annotations(8081),
		containers: vec![container],
		service_account: Some(GATEWAY_PROXY.to_string()),
		volumes: vec![volume(json!({
			"name": "envoy-config",
			"configMap": {"name": "gateway-proxy-envoy-config"}
		}))],
		..BuilderSpec::new(NAMESPACE, GATEWAY_PROXY)
	}
}

/// The default gateway proxy service.
pub fn proxy_service_spec() -> BuilderSpec {
	BuilderSpec {
		labels: proxy_labels(),
		global_labels: installation_labels(),
		selector: Some(labels([
			("gateway-proxy", "live"),
			("gateway-proxy-id", GATEWAY_PROXY),
		])),
		service: ServiceSpec {
			ports: vec![
				PortSpec::new("http", 80).targeting(8080),
				PortSpec::new("https", 443).targeting(8443),
			],
			service_type: Some("LoadBalancer".to_string()),
		},
		..BuilderSpec::new(NAMESPACE, GATEWAY_PROXY)
	}
}
