//! Factory for fully defaulted expected resources.
//!
//! The factory functions apply the same defaults the gateway chart applies, so
//! a test only spells out what differs from a stock install. Each function
//! takes a [`BuilderSpec`] and returns a typed `k8s-openapi` object, ready to be
//! patched further and wrapped in an [`ExpectedResource`](crate::ExpectedResource).
//!
//! | field | default |
//! |---|---|
//! | `replicas` | 1 |
//! | `selector` | `labels` without `app` |
//! | pod template labels | selector merged with `pod_labels` |
//! | `annotations` | pod template for workloads, metadata otherwise |
//! | `service_account` | the resource name |
//! | container name | image repository |
//! | pull policy | `IfNotPresent` |
//! | security | drop `ALL`, non-root user 10101, read-only root, no escalation |
//! | service port | protocol `TCP`, target port = port |

use std::fmt;

use k8s_openapi::{
	api::{
		apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec},
		core::v1::{
			Capabilities, ConfigMap, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction,
			ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
			SecurityContext, Service, ServicePort, ServiceSpec as KubeServiceSpec,
			TCPSocketAction, Volume, VolumeMount,
		},
	},
	apimachinery::pkg::{
		apis::meta::v1::{LabelSelector, ObjectMeta},
		util::intstr::IntOrString,
	},
};
use thiserror::Error;

use crate::labels::{merge_labels, without_keys, LabelConflict, Labels};

pub const DEFAULT_REGISTRY: &str = "quay.io/solo-io";
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";
pub const UNPRIVILEGED_USER: i64 = 10101;
/// Chart-wide label every resource carries; never part of a selector.
pub const APP_LABEL: &str = "app";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
	#[error("merging labels of {resource}")]
	LabelConflict {
		resource: String,
		#[source]
		source: LabelConflict,
	},

	#[error("workload {name} has no containers")]
	NoContainers { name: String },
}

/// Inputs of the resource factory.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderSpec {
	pub namespace: String,
	pub name: String,
	/// Labels of the resource itself.
	pub labels: Labels,
	/// Installation-wide labels added to every top-level resource.
	pub global_labels: Labels,
	/// Overrides the computed selector.
	pub selector: Option<Labels>,
	/// Extra pod template labels on top of the selector.
	pub pod_labels: Labels,
	pub annotations: Labels,
	pub containers: Vec<ContainerSpec>,
	pub service: ServiceSpec,
	/// Config map data.
	pub data: Labels,
	/// Defaults to the resource name.
	pub service_account: Option<String>,
	pub replicas: i32,
	pub volumes: Vec<Volume>,
}

impl Default for BuilderSpec {
	fn default() -> Self {
		Self {
			namespace: String::new(),
			name: String::new(),
			labels: Labels::new(),
			global_labels: Labels::new(),
			selector: None,
			pod_labels: Labels::new(),
			annotations: Labels::new(),
			containers: Vec::new(),
			service: ServiceSpec::default(),
			data: Labels::new(),
			service_account: None,
			replicas: 1,
			volumes: Vec::new(),
		}
	}
}

impl BuilderSpec {
	pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			name: name.into(),
			..Default::default()
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
	pub registry: String,
	pub repository: String,
	pub tag: String,
}

impl fmt::Display for ImageSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityProfile {
	/// Non-root, read-only, all capabilities dropped.
	#[default]
	Standard,
	/// Like `Standard` but keeps root and may bind privileged ports.
	NetBind,
	/// No security context at all.
	Unconfined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSpec {
	/// Readiness probe on a TCP port.
	Tcp { port: i32 },
	/// Readiness and liveness commands.
	Exec {
		readiness: Vec<String>,
		liveness: Vec<String>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPortSpec {
	pub name: String,
	pub port: i32,
}

impl ContainerPortSpec {
	pub fn new(name: impl Into<String>, port: i32) -> Self {
		Self {
			name: name.into(),
			port,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
	pub image: ImageSpec,
	/// Defaults to the image repository.
	pub name: Option<String>,
	pub pull_policy: String,
	pub env: Vec<EnvVar>,
	pub args: Vec<String>,
	pub ports: Vec<ContainerPortSpec>,
	pub security: SecurityProfile,
	pub probes: Option<ProbeSpec>,
	pub volume_mounts: Vec<VolumeMount>,
	pub resources: Option<ResourceRequirements>,
}

impl ContainerSpec {
	/// Container running an image from the default registry.
	pub fn quay(repository: &str, tag: &str, env: Vec<EnvVar>) -> Self {
		Self::from_registry(DEFAULT_REGISTRY, repository, tag, env)
	}

	pub fn from_registry(registry: &str, repository: &str, tag: &str, env: Vec<EnvVar>) -> Self {
		Self {
			image: ImageSpec {
				registry: registry.to_string(),
				repository: repository.to_string(),
				tag: tag.to_string(),
			},
			name: None,
			pull_policy: DEFAULT_PULL_POLICY.to_string(),
			env,
			args: Vec::new(),
			ports: Vec::new(),
			security: SecurityProfile::Standard,
			probes: None,
			volume_mounts: Vec::new(),
			resources: None,
		}
	}

	pub fn name(&self) -> &str {
		self.name.as_deref().unwrap_or(&self.image.repository)
	}
}

/// Port exposed by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
	pub name: String,
	pub port: i32,
	/// Defaults to `port`.
	pub target_port: Option<i32>,
	/// Defaults to `TCP`.
	pub protocol: Option<String>,
}

impl PortSpec {
	pub fn new(name: impl Into<String>, port: i32) -> Self {
		Self {
			name: name.into(),
			port,
			target_port: None,
			protocol: None,
		}
	}

	#[must_use]
	pub fn targeting(mut self, target_port: i32) -> Self {
		self.target_port = Some(target_port);
		self
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSpec {
	pub ports: Vec<PortSpec>,
	/// Omitted unless set, which Kubernetes reads as `ClusterIP`.
	pub service_type: Option<String>,
}

pub fn env_var(name: &str, value: &str) -> EnvVar {
	EnvVar {
		name: name.to_string(),
		value: Some(value.to_string()),
		..Default::default()
	}
}

fn field_ref_env(name: &str, field_path: &str) -> EnvVar {
	EnvVar {
		name: name.to_string(),
		value_from: Some(EnvVarSource {
			field_ref: Some(ObjectFieldSelector {
				field_path: field_path.to_string(),
				..Default::default()
			}),
			..Default::default()
		}),
		..Default::default()
	}
}

/// `POD_NAMESPACE` from the downward API.
pub fn pod_namespace_env() -> EnvVar {
	field_ref_env("POD_NAMESPACE", "metadata.namespace")
}

/// `POD_NAME` from the downward API.
pub fn pod_name_env() -> EnvVar {
	field_ref_env("POD_NAME", "metadata.name")
}

pub fn stats_server_env() -> EnvVar {
	env_var("START_STATS_SERVER", "true")
}

/// The selector the chart computes: explicit override, or labels minus `app`.
pub fn selector_labels(spec: &BuilderSpec) -> Labels {
	spec.selector
		.clone()
		.unwrap_or_else(|| without_keys(&spec.labels, &[APP_LABEL]))
}

fn merged(resource: &str, a: &Labels, b: &Labels) -> Result<Labels, BuildError> {
	merge_labels(a, b).map_err(|source| BuildError::LabelConflict {
		resource: resource.to_string(),
		source,
	})
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
	(!items.is_empty()).then(|| items.to_vec())
}

fn non_empty_map(map: Labels) -> Option<Labels> {
	(!map.is_empty()).then_some(map)
}

fn metadata(spec: &BuilderSpec, annotations: Option<Labels>) -> Result<ObjectMeta, BuildError> {
	let labels = merged(&spec.name, &spec.labels, &spec.global_labels)?;
	Ok(ObjectMeta {
		name: Some(spec.name.clone()),
		namespace: (!spec.namespace.is_empty()).then(|| spec.namespace.clone()),
		labels: non_empty_map(labels),
		annotations,
		..Default::default()
	})
}

pub fn security_context(profile: SecurityProfile) -> Option<SecurityContext> {
	let drop_all = Some(vec!["ALL".to_string()]);
	match profile {
		SecurityProfile::Standard => Some(SecurityContext {
			capabilities: Some(Capabilities {
				drop: drop_all,
				..Default::default()
			}),
			run_as_non_root: Some(true),
			run_as_user: Some(UNPRIVILEGED_USER),
			read_only_root_filesystem: Some(true),
			allow_privilege_escalation: Some(false),
			..Default::default()
		}),
		SecurityProfile::NetBind => Some(SecurityContext {
			capabilities: Some(Capabilities {
				add: Some(vec!["NET_BIND_SERVICE".to_string()]),
				drop: drop_all,
			}),
			read_only_root_filesystem: Some(true),
			allow_privilege_escalation: Some(false),
			..Default::default()
		}),
		SecurityProfile::Unconfined => None,
	}
}

/// Readiness and liveness probes for a probe spec.
pub fn probes(spec: Option<&ProbeSpec>) -> (Option<Probe>, Option<Probe>) {
	match spec {
		None => (None, None),
		Some(ProbeSpec::Tcp { port }) => (
			Some(Probe {
				tcp_socket: Some(TCPSocketAction {
					port: IntOrString::Int(*port),
					..Default::default()
				}),
				initial_delay_seconds: Some(1),
				period_seconds: Some(2),
				failure_threshold: Some(10),
				..Default::default()
			}),
			None,
		),
		Some(ProbeSpec::Exec {
			readiness,
			liveness,
		}) => {
			let exec = |command: &Vec<String>| Probe {
				exec: Some(ExecAction {
					command: Some(command.clone()),
				}),
				initial_delay_seconds: Some(1),
				period_seconds: Some(10),
				failure_threshold: Some(10),
				..Default::default()
			};
			(Some(exec(readiness)), Some(exec(liveness)))
		}
	}
}

pub fn container(spec: &ContainerSpec) -> Container {
	let (readiness_probe, liveness_probe) = probes(spec.probes.as_ref());
	let ports: Vec<ContainerPort> = spec
		.ports
		.iter()
		.map(|p| ContainerPort {
			name: Some(p.name.clone()),
			container_port: p.port,
			protocol: Some("TCP".to_string()),
			..Default::default()
		})
		.collect();

	Container {
		name: spec.name().to_string(),
		image: Some(spec.image.to_string()),
		image_pull_policy: Some(spec.pull_policy.clone()),
		env: non_empty(&spec.env),
		args: non_empty(&spec.args),
		ports: non_empty(&ports),
		security_context: security_context(spec.security),
		readiness_probe,
		liveness_probe,
		volume_mounts: non_empty(&spec.volume_mounts),
		resources: spec.resources.clone(),
		..Default::default()
	}
}

fn pod_template(spec: &BuilderSpec) -> Result<PodTemplateSpec, BuildError> {
	if spec.containers.is_empty() {
		return Err(BuildError::NoContainers {
			name: spec.name.clone(),
		});
	}
	let pod_labels = merged(&spec.name, &selector_labels(spec), &spec.pod_labels)?;

	Ok(PodTemplateSpec {
		metadata: Some(ObjectMeta {
			labels: non_empty_map(pod_labels),
			annotations: non_empty_map(spec.annotations.clone()),
			..Default::default()
		}),
		spec: Some(PodSpec {
			containers: spec.containers.iter().map(container).collect(),
			service_account_name: Some(
				spec.service_account
					.clone()
					.unwrap_or_else(|| spec.name.clone()),
			),
			volumes: non_empty(&spec.volumes),
			..Default::default()
		}),
	})
}

fn label_selector(spec: &BuilderSpec) -> LabelSelector {
	LabelSelector {
		match_labels: Some(selector_labels(spec)),
		..Default::default()
	}
}

pub fn deployment(spec: &BuilderSpec) -> Result<Deployment, BuildError> {
	Ok(Deployment {
		metadata: metadata(spec, None)?,
		spec: Some(DeploymentSpec {
			replicas: Some(spec.replicas),
			selector: label_selector(spec),
			template: pod_template(spec)?,
			..Default::default()
		}),
		..Default::default()
	})
}

/// The host-network daemon set the chart renders instead of a deployment.
pub fn daemon_set_from(deployment: &Deployment) -> DaemonSet {
	let spec = deployment.spec.clone().unwrap_or_default();
	let mut template = spec.template;
	if let Some(pod) = template.spec.as_mut() {
		for container in &mut pod.containers {
			for port in container.ports.iter_mut().flatten() {
				port.host_port = Some(port.container_port);
			}
		}
		pod.host_network = Some(true);
		pod.dns_policy = Some("ClusterFirstWithHostNet".to_string());
	}

	DaemonSet {
		metadata: deployment.metadata.clone(),
		spec: Some(DaemonSetSpec {
			selector: spec.selector,
			template,
			..Default::default()
		}),
		..Default::default()
	}
}

pub fn service(spec: &BuilderSpec) -> Result<Service, BuildError> {
	let ports = spec
		.service
		.ports
		.iter()
		.map(|p| ServicePort {
			name: Some(p.name.clone()),
			port: p.port,
			protocol: Some(p.protocol.clone().unwrap_or_else(|| "TCP".to_string())),
			target_port: Some(IntOrString::Int(p.target_port.unwrap_or(p.port))),
			..Default::default()
		})
		.collect::<Vec<_>>();

	Ok(Service {
		metadata: metadata(spec, non_empty_map(spec.annotations.clone()))?,
		spec: Some(KubeServiceSpec {
			selector: Some(selector_labels(spec)),
			ports: non_empty(&ports),
			type_: spec.service.service_type.clone(),
			..Default::default()
		}),
		..Default::default()
	})
}

pub fn config_map(spec: &BuilderSpec) -> Result<ConfigMap, BuildError> {
	Ok(ConfigMap {
		metadata: metadata(spec, non_empty_map(spec.annotations.clone()))?,
		data: non_empty_map(spec.data.clone()),
		..Default::default()
	})
}
