//! The chart's templates.
//!
//! Each function renders one template file for the merged values. Output
//! mirrors what `helm template` prints for the real chart: every top-level
//! resource carries `app: gloo` and the installation id label, pod templates
//! carry only their selector labels.

use chart_manifest::{
	builder::{DEFAULT_PULL_POLICY, DEFAULT_REGISTRY, UNPRIVILEGED_USER},
	gateway::defaults::GATEWAY_BIND_ADDRESS,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::{
	envoy::{Bootstrap, READ_CONFIG_PORT},
	values::{merge_into, Scope},
};

pub const INSTALLATION_ID_LABEL: &str = "installationId";
const CONTROL_PLANE_STATS_PORT: i64 = 9091;
const CERTGEN: &str = "gateway-certgen";
const ACCESS_LOGGER: &str = "gateway-proxy-access-logger";

#[derive(Debug, Error)]
pub enum TemplateError {
	#[error("rendering the envoy bootstrap")]
	Bootstrap(#[from] serde_yaml::Error),

	#[error("error calling include: no template {0:?}")]
	MissingHelper(String),

	#[error("proxy {proxy}: {key} must be {expected}")]
	WrongType {
		proxy: String,
		key: &'static str,
		expected: &'static str,
	},
}

/// One rendered document and the template it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
	pub source: String,
	pub body: Value,
}

fn document(template: &str, body: Value) -> Document {
	Document {
		source: format!("gloo/templates/{template}"),
		body,
	}
}

pub struct Context<'a> {
	pub namespace: &'a str,
	pub version: &'a str,
	pub installation_id: &'a str,
	pub values: Scope<'a>,
}

impl Context<'_> {
	fn labels(&self, component: &[(&str, &str)]) -> Value {
		let mut labels = Map::new();
		labels.insert("app".to_string(), json!("gloo"));
		for (key, value) in component {
			labels.insert((*key).to_string(), json!(value));
		}
		labels.insert(INSTALLATION_ID_LABEL.to_string(), json!(self.installation_id));
		Value::Object(labels)
	}

	fn metadata(&self, name: &str, component: &[(&str, &str)]) -> Value {
		json!({"name": name, "namespace": self.namespace, "labels": self.labels(component)})
	}

	fn cluster_metadata(&self, name: &str, component: &[(&str, &str)]) -> Value {
		json!({"name": name, "labels": self.labels(component)})
	}

	/// Image reference and pull policy, falling back to the global image settings.
	fn image(&self, image: Scope<'_>) -> (String, String) {
		let global = self.values.scope("global.image");
		let registry = image
			.string("registry")
			.or_else(|| global.string("registry"))
			.unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
		let repository = image.string("repository").unwrap_or_default();
		let tag = image
			.string("tag")
			.unwrap_or_else(|| self.version.to_string());
		let pull_policy = image
			.string("pullPolicy")
			.or_else(|| global.string("pullPolicy"))
			.unwrap_or_else(|| DEFAULT_PULL_POLICY.to_string());
		(format!("{registry}/{repository}:{tag}"), pull_policy)
	}
}

fn with_annotations(mut metadata: Value, annotations: Value) -> Value {
	metadata["annotations"] = annotations;
	metadata
}

fn hook(weight: &str) -> Value {
	json!({"helm.sh/hook": "pre-install", "helm.sh/hook-weight": weight})
}

fn stats_annotations(port: i64) -> Value {
	json!({
		"prometheus.io/path": "/metrics",
		"prometheus.io/port": port.to_string(),
		"prometheus.io/scrape": "true"
	})
}

fn pairs(entries: &[(&str, &str)]) -> Value {
	Value::Object(
		entries
			.iter()
			.map(|(k, v)| ((*k).to_string(), json!(v)))
			.collect(),
	)
}

fn env_var(name: &str, value: &str) -> Value {
	json!({"name": name, "value": value})
}

fn field_env(name: &str, field_path: &str) -> Value {
	json!({"name": name, "valueFrom": {"fieldRef": {"fieldPath": field_path}}})
}

fn container_port(name: &str, port: i64) -> Value {
	json!({"name": name, "containerPort": port, "protocol": "TCP"})
}

fn service_port(name: &str, port: i64, target: i64) -> Value {
	json!({"name": name, "port": port, "protocol": "TCP", "targetPort": target})
}

fn restricted_security() -> Value {
	json!({
		"capabilities": {"drop": ["ALL"]},
		"runAsNonRoot": true,
		"runAsUser": UNPRIVILEGED_USER,
		"readOnlyRootFilesystem": true,
		"allowPrivilegeEscalation": false
	})
}

fn tcp_probe(port: i64) -> Value {
	json!({
		"tcpSocket": {"port": port},
		"initialDelaySeconds": 1,
		"periodSeconds": 2,
		"failureThreshold": 10
	})
}

fn exec_probe(path: &str) -> Value {
	json!({
		"exec": {"command": ["wget", "-O", "/dev/null", format!("localhost:19000/{path}")]},
		"initialDelaySeconds": 1,
		"periodSeconds": 10,
		"failureThreshold": 10
	})
}

fn pod_metadata(labels: Value, annotations: Option<Value>) -> Value {
	let mut metadata = json!({"labels": labels});
	if let Some(annotations) = annotations {
		metadata["annotations"] = annotations;
	}
	metadata
}

fn copy_resources(container: &mut Value, scope: Scope<'_>) {
	if let Some(resources) = scope.get("resources") {
		container["resources"] = resources.clone();
	}
}

fn deployment(metadata: Value, replicas: i64, selector: Value, template: Value, pod: Value) -> Value {
	json!({
		"apiVersion": "apps/v1",
		"kind": "Deployment",
		"metadata": metadata,
		"spec": {
			"replicas": replicas,
			"selector": {"matchLabels": selector},
			"template": {"metadata": template, "spec": pod}
		}
	})
}

fn service(metadata: Value, selector: Value, ports: Vec<Value>) -> Value {
	json!({
		"apiVersion": "v1",
		"kind": "Service",
		"metadata": metadata,
		"spec": {"selector": selector, "ports": ports}
	})
}

/// `gatewayProxy` → `gateway-proxy`.
pub fn kebab_case(key: &str) -> String {
	let mut out = String::with_capacity(key.len() + 4);
	for c in key.chars() {
		if c.is_ascii_uppercase() {
			if !out.is_empty() {
				out.push('-');
			}
			out.push(c.to_ascii_lowercase());
		} else if c == '_' {
			out.push('-');
		} else {
			out.push(c);
		}
	}
	out
}

/// A gateway proxy and its values, merged over the `gatewayProxy` defaults.
#[derive(Debug, Clone)]
pub struct Proxy {
	pub name: String,
	values: Value,
}

impl Proxy {
	fn scope(&self) -> Scope<'_> {
		Scope::new(&self.values)
	}
}

pub fn proxies(values: Scope<'_>) -> Vec<Proxy> {
	let base = values
		.get("gatewayProxies.gatewayProxy")
		.cloned()
		.unwrap_or_else(|| json!({}));
	values
		.entries("gatewayProxies")
		.into_iter()
		.filter(|(_, spec)| !spec.bool("disabled"))
		.map(|(key, spec)| {
			let merged = if key == "gatewayProxy" {
				spec.as_value().clone()
			} else {
				let mut merged = base.clone();
				merge_into(&mut merged, spec.as_value().clone());
				merged
			};
			Proxy {
				name: kebab_case(key),
				values: merged,
			}
		})
		.collect()
}

fn namespace(ctx: &Context<'_>) -> Option<Document> {
	ctx.values.bool("namespace.create").then(|| {
		document(
			"0-namespace.yaml",
			json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": ctx.cluster_metadata(ctx.namespace, &[])
			}),
		)
	})
}

fn service_account(ctx: &Context<'_>, name: &str, component: &str) -> Document {
	document(
		"0-service-accounts.yaml",
		json!({
			"apiVersion": "v1",
			"kind": "ServiceAccount",
			"metadata": ctx.metadata(name, &[("gloo", component)])
		}),
	)
}

fn settings(ctx: &Context<'_>) -> Document {
	let values = ctx.values;
	let gloo = values.scope("gloo.deployment");
	let xds_port = gloo.int("xdsPort").unwrap_or(9977);
	let validation_port = gloo.int("validationPort").unwrap_or(9988);

	let mut gloo_spec = json!({"xdsBindAddr": format!("0.0.0.0:{xds_port}")});
	let policy = values.scope("settings.invalidConfigPolicy");
	if values.is_set("settings.invalidConfigPolicy") {
		gloo_spec["invalidConfigPolicy"] = json!({
			"invalidRouteResponseCode": policy.int("invalidRouteResponseCode").unwrap_or(404),
			"invalidRouteResponseBody": policy.string("invalidRouteResponseBody").unwrap_or_default()
		});
	}

	let mut gateway = json!({
		"readGatewaysFromAllNamespaces": values.bool("gateway.readGatewaysFromAllNamespaces")
	});
	if values.bool("gateway.validation.enabled") {
		gateway["validation"] = json!({
			"alwaysAccept": values.bool_or("gateway.validation.alwaysAccept", true),
			"proxyValidationServerAddr": format!("gloo:{validation_port}")
		});
	}

	let mut spec = json!({
		"discoveryNamespace": ctx.namespace,
		"refreshRate": values.string("settings.refreshRate").unwrap_or_else(|| "60s".to_string()),
		"gloo": gloo_spec,
		"gateway": gateway,
		"kubernetesArtifactSource": {},
		"kubernetesConfigSource": {},
		"kubernetesSecretSource": {}
	});
	if !values.bool("discovery.enabled") {
		spec["discovery"] = json!({"fdsMode": "DISABLED"});
	}

	document(
		"1-settings.yaml",
		json!({
			"apiVersion": "gloo.solo.io/v1",
			"kind": "Settings",
			"metadata": with_annotations(ctx.metadata("default", &[]), hook("5")),
			"spec": spec
		}),
	)
}

fn gloo_deployment(ctx: &Context<'_>) -> Document {
	let deploy = ctx.values.scope("gloo.deployment");
	let (image, pull_policy) = ctx.image(deploy.scope("image"));
	let xds_port = deploy.int("xdsPort").unwrap_or(9977);
	let validation_port = deploy.int("validationPort").unwrap_or(9988);
	let stats = deploy.bool_or("stats", true);

	let mut env = vec![field_env("POD_NAMESPACE", "metadata.namespace")];
	if stats {
		env.push(env_var("START_STATS_SERVER", "true"));
	}
	if deploy.bool("disableUsageStatistics") {
		env.push(env_var("DISABLE_USAGE_REPORTING", "true"));
	}

	let mut container = json!({
		"name": "gloo",
		"image": image,
		"imagePullPolicy": pull_policy,
		"env": env,
		"ports": [
			container_port("grpc-xds", xds_port),
			container_port("grpc-validation", validation_port)
		],
		"securityContext": restricted_security(),
		"volumeMounts": [{"name": "labels-volume", "mountPath": "/etc/gloo", "readOnly": true}],
		"readinessProbe": tcp_probe(xds_port)
	});
	copy_resources(&mut container, deploy);

	let selector = pairs(&[("gloo", "gloo")]);
	document(
		"1-gloo-deployment.yaml",
		deployment(
			ctx.metadata("gloo", &[("gloo", "gloo")]),
			deploy.int("replicas").unwrap_or(1),
			selector.clone(),
			pod_metadata(selector, stats.then(|| stats_annotations(CONTROL_PLANE_STATS_PORT))),
			json!({
				"serviceAccountName": "gloo",
				"containers": [container],
				"volumes": [{
					"name": "labels-volume",
					"downwardAPI": {
						"items": [{"path": "labels", "fieldRef": {"fieldPath": "metadata.labels"}}]
					}
				}]
			}),
		),
	)
}

fn gloo_service(ctx: &Context<'_>) -> Document {
	let deploy = ctx.values.scope("gloo.deployment");
	let xds_port = deploy.int("xdsPort").unwrap_or(9977);
	let validation_port = deploy.int("validationPort").unwrap_or(9988);
	document(
		"2-gloo-service.yaml",
		service(
			ctx.metadata("gloo", &[("gloo", "gloo")]),
			pairs(&[("gloo", "gloo")]),
			vec![
				service_port("grpc-xds", xds_port, xds_port),
				service_port("grpc-validation", validation_port, validation_port),
			],
		),
	)
}

fn discovery_deployment(ctx: &Context<'_>) -> Document {
	let deploy = ctx.values.scope("discovery.deployment");
	let (image, pull_policy) = ctx.image(deploy.scope("image"));
	let stats = deploy.bool_or("stats", true);

	let mut env = vec![field_env("POD_NAMESPACE", "metadata.namespace")];
	if stats {
		env.push(env_var("START_STATS_SERVER", "true"));
	}
	let mut container = json!({
		"name": "discovery",
		"image": image,
		"imagePullPolicy": pull_policy,
		"env": env,
		"securityContext": restricted_security()
	});
	copy_resources(&mut container, deploy);

	let selector = pairs(&[("gloo", "discovery")]);
	document(
		"3-discovery-deployment.yaml",
		deployment(
			ctx.metadata("discovery", &[("gloo", "discovery")]),
			deploy.int("replicas").unwrap_or(1),
			selector.clone(),
			pod_metadata(selector, stats.then(|| stats_annotations(CONTROL_PLANE_STATS_PORT))),
			json!({"serviceAccountName": "discovery", "containers": [container]}),
		),
	)
}

fn gateway_deployment(ctx: &Context<'_>) -> Document {
	let deploy = ctx.values.scope("gateway.deployment");
	let validation = ctx.values.scope("gateway.validation");
	let validation_enabled = ctx.values.bool("gateway.validation.enabled");
	let (image, pull_policy) = ctx.image(deploy.scope("image"));
	let stats = deploy.bool_or("stats", true);

	let mut env = vec![field_env("POD_NAMESPACE", "metadata.namespace")];
	if stats {
		env.push(env_var("START_STATS_SERVER", "true"));
	}
	let mut container = json!({
		"name": "gateway",
		"image": image,
		"imagePullPolicy": pull_policy,
		"securityContext": restricted_security()
	});
	let mut pod = json!({"serviceAccountName": "gateway"});

	if validation_enabled {
		let https_port = validation.int("httpsPort").unwrap_or(8443);
		let secret = validation
			.string("secretName")
			.unwrap_or_else(|| "gateway-validation-certs".to_string());
		env.push(env_var("VALIDATION_MUST_START", "true"));
		container["ports"] = json!([container_port("https", https_port)]);
		container["volumeMounts"] =
			json!([{"name": "validation-certs", "mountPath": "/etc/gateway/validation-certs"}]);
		container["readinessProbe"] = tcp_probe(https_port);
		pod["volumes"] = json!([{
			"name": "validation-certs",
			"secret": {"secretName": secret, "defaultMode": 420}
		}]);
	}
	container["env"] = Value::Array(env);
	copy_resources(&mut container, deploy);
	pod["containers"] = json!([container]);

	let selector = pairs(&[("gloo", "gateway")]);
	document(
		"5-gateway-deployment.yaml",
		deployment(
			ctx.metadata("gateway", &[("gloo", "gateway")]),
			deploy.int("replicas").unwrap_or(1),
			selector.clone(),
			pod_metadata(selector, stats.then(|| stats_annotations(CONTROL_PLANE_STATS_PORT))),
			pod,
		),
	)
}

fn gateway_service(ctx: &Context<'_>) -> Document {
	let https_port = ctx
		.values
		.int("gateway.validation.httpsPort")
		.unwrap_or(8443);
	document(
		"5-gateway-service.yaml",
		service(
			ctx.metadata(
				"gateway",
				&[("discovery.solo.io/function_discovery", "disabled"), ("gloo", "gateway")],
			),
			pairs(&[("gloo", "gateway")]),
			vec![service_port("https", 443, https_port)],
		),
	)
}

fn validation_webhook(ctx: &Context<'_>) -> Document {
	let name = format!("gloo-gateway-validation-webhook-{}", ctx.namespace);
	let failure_policy = ctx
		.values
		.string("gateway.validation.failurePolicy")
		.unwrap_or_else(|| "Ignore".to_string());
	document(
		"5-gateway-validation-webhook-configuration.yaml",
		json!({
			"apiVersion": "admissionregistration.k8s.io/v1beta1",
			"kind": "ValidatingWebhookConfiguration",
			"metadata": with_annotations(ctx.cluster_metadata(&name, &[("gloo", "gateway")]), hook("5")),
			"webhooks": [{
				"name": format!("gateway.{}.svc", ctx.namespace),
				"clientConfig": {
					"service": {"name": "gateway", "namespace": ctx.namespace, "path": "/validation"},
					"caBundle": ""
				},
				"rules": [{
					"operations": ["CREATE", "UPDATE", "DELETE"],
					"apiGroups": ["gateway.solo.io"],
					"apiVersions": ["v1"],
					"resources": ["*"]
				}],
				"failurePolicy": failure_policy
			}]
		}),
	)
}

fn certgen(ctx: &Context<'_>) -> Vec<Document> {
	let job_values = ctx.values.scope("gateway.certGenJob");
	let secret = ctx
		.values
		.string("gateway.validation.secretName")
		.unwrap_or_else(|| "gateway-validation-certs".to_string());
	let rbac_name = format!("gloo-gateway-secret-create-vwc-update-{}", ctx.namespace);
	let webhook = format!("gloo-gateway-validation-webhook-{}", ctx.namespace);
	let (image, pull_policy) = ctx.image(job_values.scope("image"));

	let service_account = json!({
		"apiVersion": "v1",
		"kind": "ServiceAccount",
		"metadata": with_annotations(ctx.metadata(CERTGEN, &[("gloo", "gateway")]), hook("5"))
	});
	let cluster_role = json!({
		"apiVersion": "rbac.authorization.k8s.io/v1",
		"kind": "ClusterRole",
		"metadata": with_annotations(ctx.cluster_metadata(&rbac_name, &[("gloo", "rbac")]), hook("5")),
		"rules": [
			{"apiGroups": [""], "resources": ["secrets"], "verbs": ["create", "get", "update"]},
			{
				"apiGroups": ["admissionregistration.k8s.io"],
				"resources": ["validatingwebhookconfigurations"],
				"verbs": ["get", "update"]
			}
		]
	});
	let binding = json!({
		"apiVersion": "rbac.authorization.k8s.io/v1",
		"kind": "ClusterRoleBinding",
		"metadata": with_annotations(ctx.cluster_metadata(&rbac_name, &[("gloo", "rbac")]), hook("5")),
		"subjects": [{"kind": "ServiceAccount", "name": CERTGEN, "namespace": ctx.namespace}],
		"roleRef": {"kind": "ClusterRole", "name": rbac_name, "apiGroup": "rbac.authorization.k8s.io"}
	});
	let job = json!({
		"apiVersion": "batch/v1",
		"kind": "Job",
		"metadata": with_annotations(ctx.metadata(CERTGEN, &[("gloo", CERTGEN)]), hook("10")),
		"spec": {
			"ttlSecondsAfterFinished": job_values.int("ttlSecondsAfterFinished").unwrap_or(60),
			"template": {
				"metadata": {"labels": {"gloo": CERTGEN}},
				"spec": {
					"serviceAccountName": CERTGEN,
					"containers": [{
						"name": "certgen",
						"image": image,
						"imagePullPolicy": pull_policy,
						"env": [field_env("POD_NAMESPACE", "metadata.namespace")],
						"args": [
							format!("--secret-name={secret}"),
							"--svc-name=gateway",
							format!("--validating-webhook-configuration-name={webhook}")
						]
					}],
					"restartPolicy": "OnFailure"
				}
			}
		}
	});

	vec![
		document("6-gateway-certgen-rbac.yaml", service_account),
		document("6-gateway-certgen-rbac.yaml", cluster_role),
		document("6-gateway-certgen-rbac.yaml", binding),
		document("6.5-gateway-certgen.yaml", job),
	]
}

/// Named templates the chart defines for `include`.
fn helper(name: &str) -> Option<Vec<Value>> {
	match name {
		"gloo.testcontainer" => Some(vec![json!({
			"name": "nginx",
			"image": "nginx:1.7.9",
			"ports": [{"containerPort": 80}]
		})]),
		_ => None,
	}
}

fn ingress_deployment(ctx: &Context<'_>) -> Option<Document> {
	let values = ctx.values;
	let kube_ingress = values.bool("ingress.enabled");
	let knative = values.scope("settings.integrations.knative");
	if !kube_ingress && !knative.bool("enabled") {
		return None;
	}
	let deploy = values.scope("ingress.deployment");
	let (image, pull_policy) = ctx.image(deploy.scope("image"));

	let mut env = vec![field_env("POD_NAMESPACE", "metadata.namespace")];
	if knative.bool("enabled") {
		env.push(env_var("ENABLE_KNATIVE_INGRESS", "true"));
		env.push(env_var(
			"KNATIVE_VERSION",
			&knative.string("version").unwrap_or_default(),
		));
	}
	if !kube_ingress {
		env.push(env_var("DISABLE_KUBE_INGRESS", "true"));
	}
	let mut container = json!({
		"name": "ingress",
		"image": image,
		"imagePullPolicy": pull_policy,
		"env": env
	});
	copy_resources(&mut container, deploy);

	let selector = pairs(&[("gloo", "ingress")]);
	Some(document(
		"4-ingress-deployment.yaml",
		deployment(
			ctx.metadata("ingress", &[("gloo", "ingress")]),
			deploy.int("replicas").unwrap_or(1),
			selector.clone(),
			pod_metadata(selector, None),
			json!({"containers": [container]}),
		),
	))
}

fn proxy_labels(proxy: &Proxy) -> [(&str, &str); 2] {
	[("gloo", "gateway-proxy"), ("gateway-proxy-id", proxy.name.as_str())]
}

fn proxy_workload(ctx: &Context<'_>, proxy: &Proxy) -> Result<Option<Document>, TemplateError> {
	let values = proxy.scope();
	let pod = values.scope("podTemplate");
	let (image, pull_policy) = ctx.image(pod.scope("image"));
	let http_port = pod.int("httpPort").unwrap_or(8080);
	let https_port = pod.int("httpsPort").unwrap_or(8443);
	let daemon_set = !values.is_set("kind.deployment") && values.is_set("kind.daemonSet");
	if !values.is_set("kind.deployment") && !daemon_set {
		return Ok(None);
	}
	let sidecars = match values.str("extraContainersHelper").filter(|name| !name.is_empty()) {
		None => Vec::new(),
		Some(name) => helper(name).ok_or_else(|| TemplateError::MissingHelper(name.to_string()))?,
	};
	let host_port = daemon_set && values.bool("kind.daemonSet.hostPort");

	let mut capabilities = json!({"drop": ["ALL"]});
	if !pod.bool("disableNetBind") {
		capabilities["add"] = json!(["NET_BIND_SERVICE"]);
	}
	let mut security = json!({
		"capabilities": capabilities,
		"readOnlyRootFilesystem": true,
		"allowPrivilegeEscalation": false
	});
	if pod.bool("runUnprivileged") {
		security["runAsNonRoot"] = json!(true);
		security["runAsUser"] = json!(UNPRIVILEGED_USER);
	}

	let mut ports = vec![container_port("http", http_port), container_port("https", https_port)];
	if host_port {
		for port in &mut ports {
			port["hostPort"] = port["containerPort"].clone();
		}
	}

	let mut mounts = vec![json!({"name": "envoy-config", "mountPath": "/etc/envoy"})];
	let mut volumes = vec![json!({
		"name": "envoy-config",
		"configMap": {"name": format!("{}-envoy-config", proxy.name)}
	})];
	// Sidecars share a scratch volume with envoy.
	if !sidecars.is_empty() {
		mounts.push(json!({"name": "shared-data", "mountPath": "/usr/share/shared-data"}));
		volumes.push(json!({"name": "shared-data", "emptyDir": {}}));
	}

	let mut container = json!({
		"name": "gateway-proxy",
		"image": image,
		"imagePullPolicy": pull_policy,
		"args": ["--disable-hot-restart"],
		"env": [
			field_env("POD_NAMESPACE", "metadata.namespace"),
			field_env("POD_NAME", "metadata.name")
		],
		"ports": ports,
		"securityContext": security,
		"volumeMounts": mounts
	});
	if pod.bool("probes") {
		container["readinessProbe"] = exec_probe("ready");
		container["livenessProbe"] = exec_probe("server_info");
	}
	copy_resources(&mut container, pod);

	let mut annotations = stats_annotations(values.int("stats.port").unwrap_or(8081));
	if values.bool("readConfig") {
		annotations["readconfig-stats"] = json!("/stats");
		annotations["readconfig-ready"] = json!("/ready");
		annotations["readconfig-config_dump"] = json!("/config_dump");
		annotations["readconfig-port"] = json!(READ_CONFIG_PORT.to_string());
	}

	let mut containers = vec![container];
	containers.extend(sidecars);
	let mut pod_spec = json!({
		"serviceAccountName": "gateway-proxy",
		"containers": containers,
		"volumes": volumes
	});
	if !daemon_set && values.bool("kind.deployment.antiAffinity") {
		pod_spec["affinity"] = json!({
			"podAntiAffinity": {
				"preferredDuringSchedulingIgnoredDuringExecution": [{
					"weight": 100,
					"podAffinityTerm": {
						"topologyKey": "kubernetes.io/hostname",
						"labelSelector": {"matchLabels": {"gloo": "gateway-proxy"}}
					}
				}]
			}
		});
	}
	if host_port {
		pod_spec["hostNetwork"] = json!(true);
		pod_spec["dnsPolicy"] = json!("ClusterFirstWithHostNet");
	}

	let labels = proxy_labels(proxy);
	let selector = pairs(&labels);
	let template_labels = pairs(&[
		labels[0],
		labels[1],
		("gateway-proxy", "live"),
	]);
	let metadata = ctx.metadata(&proxy.name, &labels);
	let template = pod_metadata(template_labels, Some(annotations));

	let body = if daemon_set {
		json!({
			"apiVersion": "apps/v1",
			"kind": "DaemonSet",
			"metadata": metadata,
			"spec": {
				"selector": {"matchLabels": selector},
				"template": {"metadata": template, "spec": pod_spec}
			}
		})
	} else {
		deployment(
			metadata,
			values.int("kind.deployment.replicas").unwrap_or(1),
			selector,
			template,
			pod_spec,
		)
	};
	Ok(Some(document("7-gateway-proxy-deployment.yaml", body)))
}

fn proxy_service(ctx: &Context<'_>, proxy: &Proxy) -> Document {
	let values = proxy.scope();
	let pod = values.scope("podTemplate");
	let svc = values.scope("service");

	let mut metadata = ctx.metadata(&proxy.name, &proxy_labels(proxy));
	let extra = svc.string_map("extraAnnotations");
	if !extra.is_empty() {
		metadata["annotations"] = json!(extra);
	}

	let mut body = service(
		metadata,
		pairs(&[("gateway-proxy", "live"), ("gateway-proxy-id", proxy.name.as_str())]),
		vec![
			service_port(
				"http",
				svc.int("httpPort").unwrap_or(80),
				pod.int("httpPort").unwrap_or(8080),
			),
			service_port(
				"https",
				svc.int("httpsPort").unwrap_or(443),
				pod.int("httpsPort").unwrap_or(8443),
			),
		],
	);
	let spec = &mut body["spec"];
	spec["type"] = json!(svc.string("type").unwrap_or_else(|| "LoadBalancer".to_string()));
	for (value_key, spec_key) in [
		("externalTrafficPolicy", "externalTrafficPolicy"),
		("clusterIP", "clusterIP"),
		("loadBalancerIP", "loadBalancerIP"),
	] {
		if let Some(value) = svc.string(value_key) {
			spec[spec_key] = json!(value);
		}
	}
	document("8-gateway-proxy-service.yaml", body)
}

fn proxy_config_map(ctx: &Context<'_>, proxy: &Proxy) -> Result<Document, TemplateError> {
	let values = proxy.scope();
	let tracing_clusters = match values.get("tracing.cluster") {
		None | Some(Value::Null) => &[][..],
		Some(Value::Array(clusters)) => clusters.as_slice(),
		Some(_) => {
			return Err(TemplateError::WrongType {
				proxy: proxy.name.clone(),
				key: "tracing.cluster",
				expected: "a list of clusters",
			})
		}
	};
	let bootstrap = Bootstrap {
		namespace: ctx.namespace,
		proxy: &proxy.name,
		xds_port: ctx.values.int("gloo.deployment.xdsPort").unwrap_or(9977),
		stats_port: values.int("stats.port").unwrap_or(8081),
		read_config: values.bool("readConfig"),
		access_logger: ctx
			.values
			.bool("accessLogger.enabled")
			.then(|| ctx.values.int("accessLogger.port").unwrap_or(8083)),
		tracing_provider: values.get("tracing.provider").filter(|p| !p.is_null()),
		tracing_clusters,
	};
	let envoy = serde_yaml::to_string(&bootstrap.to_value())?;
	Ok(document(
		"9-gateway-proxy-configmap.yaml",
		json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": ctx.metadata(&format!("{}-envoy-config", proxy.name), &proxy_labels(proxy)),
			"data": {"envoy.yaml": envoy}
		}),
	))
}

fn gateways(ctx: &Context<'_>, proxy: &Proxy) -> Vec<Document> {
	let values = proxy.scope();
	let settings = values.scope("gatewaySettings");
	if settings.bool("disableGeneratedGateways") {
		return Vec::new();
	}
	let pod = values.scope("podTemplate");
	let use_proxy_proto = settings.bool("useProxyProto");

	[
		(proxy.name.clone(), pod.int("httpPort").unwrap_or(8080), false, "customHttpGateway"),
		(
			format!("{}-ssl", proxy.name),
			pod.int("httpsPort").unwrap_or(8443),
			true,
			"customHttpsGateway",
		),
	]
	.into_iter()
	.map(|(name, port, ssl, custom)| {
		let http_gateway = settings.get(custom).cloned().unwrap_or_else(|| json!({}));
		document(
			"10-gateways.yaml",
			json!({
				"apiVersion": "gateway.solo.io/v1",
				"kind": "Gateway",
				"metadata": ctx.metadata(&name, &[]),
				"spec": {
					"bindAddress": GATEWAY_BIND_ADDRESS,
					"bindPort": port,
					"httpGateway": http_gateway,
					"useProxyProto": use_proxy_proto,
					"ssl": ssl,
					"proxyNames": [proxy.name]
				}
			}),
		)
	})
	.collect()
}

fn access_logger(ctx: &Context<'_>) -> Vec<Document> {
	let logger = ctx.values.scope("accessLogger");
	let port = logger.int("port").unwrap_or(8083);
	let (image, pull_policy) = ctx.image(logger.scope("image"));
	let labels = [("gloo", ACCESS_LOGGER)];
	let selector = pairs(&[("app", "gloo"), ("gloo", ACCESS_LOGGER)]);

	let container = json!({
		"name": "access-logger",
		"image": image,
		"imagePullPolicy": pull_policy,
		"env": [
			field_env("POD_NAMESPACE", "metadata.namespace"),
			field_env("POD_NAME", "metadata.name"),
			env_var(
				"SERVICE_NAME",
				&logger.string("serviceName").unwrap_or_else(|| "AccessLog".to_string())
			),
			env_var("SERVER_PORT", &port.to_string())
		],
		"ports": [container_port("http", port)],
		"securityContext": restricted_security()
	});

	vec![
		document(
			"11-access-logger.yaml",
			deployment(
				ctx.metadata(ACCESS_LOGGER, &labels),
				logger.int("replicas").unwrap_or(1),
				selector.clone(),
				pod_metadata(selector.clone(), None),
				json!({"serviceAccountName": "gateway-proxy", "containers": [container]}),
			),
		),
		document(
			"11-access-logger.yaml",
			service(
				ctx.metadata(ACCESS_LOGGER, &labels),
				selector,
				vec![service_port("http", port, port)],
			),
		),
	]
}

/// Renders every template, in the order the chart's files sort.
pub fn render_all(ctx: &Context<'_>) -> Result<Vec<Document>, TemplateError> {
	let values = ctx.values;
	let discovery = values.bool("discovery.enabled");
	let gateway = values.bool("gateway.enabled");
	let validation = gateway && values.bool("gateway.validation.enabled");
	let proxies = proxies(values);

	let mut docs = Vec::new();
	docs.extend(namespace(ctx));

	docs.push(service_account(ctx, "gloo", "gloo"));
	if discovery {
		docs.push(service_account(ctx, "discovery", "discovery"));
	}
	if gateway {
		docs.push(service_account(ctx, "gateway", "gateway"));
	}
	if !proxies.is_empty() {
		docs.push(service_account(ctx, "gateway-proxy", "gateway-proxy"));
	}

	docs.push(gloo_deployment(ctx));
	docs.push(settings(ctx));
	docs.push(gloo_service(ctx));
	if discovery {
		docs.push(discovery_deployment(ctx));
	}
	docs.extend(ingress_deployment(ctx));
	if gateway {
		docs.push(gateway_deployment(ctx));
	}
	if validation {
		docs.push(gateway_service(ctx));
		docs.push(validation_webhook(ctx));
		if values.bool_or("gateway.certGenJob.enabled", true) {
			docs.extend(certgen(ctx));
		}
	}

	for proxy in &proxies {
		docs.extend(proxy_workload(ctx, proxy)?);
	}
	for proxy in &proxies {
		docs.push(proxy_service(ctx, proxy));
	}
	for proxy in &proxies {
		docs.push(proxy_config_map(ctx, proxy)?);
	}
	if gateway {
		for proxy in &proxies {
			docs.extend(gateways(ctx, proxy));
		}
	}
	if values.bool("accessLogger.enabled") {
		docs.extend(access_logger(ctx));
	}
	Ok(docs)
}
