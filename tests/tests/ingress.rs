mod common;

use chart_manifest::builder::{
	self, env_var, pod_namespace_env, BuilderSpec, ContainerSpec, SecurityProfile, DEFAULT_REGISTRY,
};
use common::*;
use serde_json::json;

fn ingress_spec(container: ContainerSpec) -> BuilderSpec {
	BuilderSpec {
		labels: component_labels("ingress"),
		global_labels: installation_labels(),
		containers: vec![container],
		// no account of its own: the pod runs as the namespace default
		service_account: Some(String::new()),
		..BuilderSpec::new(NAMESPACE, "ingress")
	}
}

#[test]
fn values_file_overrides_ingress_without_touching_gloo() -> TestResult {
	let manifest = render(&request().values(fixture_path("merge-ingress-values.yaml")))?;

	let mut gloo = gloo_spec(DEFAULT_REGISTRY, "Always");
	gloo.containers[0].image.tag = "dev".to_string();
	manifest.expect_typed(&builder::deployment(&gloo)?)?;

	let mut container = ContainerSpec::from_registry(
		"docker.io/ilackarms",
		"ingress",
		"test-ilackarms",
		vec![
			pod_namespace_env(),
			env_var("ENABLE_KNATIVE_INGRESS", "true"),
			env_var("KNATIVE_VERSION", "0.8.0"),
			env_var("DISABLE_KUBE_INGRESS", "true"),
		],
	);
	container.pull_policy = "Always".to_string();
	container.security = SecurityProfile::Unconfined;
	manifest.expect_typed(&builder::deployment(&ingress_spec(container))?)?;
	Ok(())
}

#[test]
fn ingress_is_off_by_default() -> TestResult {
	render(&request())?.expect_absent("Deployment", NAMESPACE, "ingress")?;
	Ok(())
}

#[test]
fn kube_ingress_without_knative() -> TestResult {
	let manifest = render_with(&[("ingress.enabled", "true")])?;

	let mut container = ContainerSpec::quay("ingress", VERSION, vec![pod_namespace_env()]);
	container.security = SecurityProfile::Unconfined;
	let doc = manifest.expect_typed(&builder::deployment(&ingress_spec(container))?)?;
	assert_eq!(
		doc.pointer("/spec/template/spec/containers/0/image"),
		Some(&json!(format!("quay.io/solo-io/ingress:{VERSION}")))
	);
	Ok(())
}
