mod common;

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use chart_manifest::{
	gateway::{
		defaults::{GATEWAY_BIND_ADDRESS, GATEWAY_PROXY_NAME, HTTPS_BIND_PORT, HTTP_BIND_PORT},
		Gateway, HttpGateway, ResourceRef, Settings,
	},
	AssertError, ConversionError, RenderRequest,
};
use common::*;
use rstest::rstest;

fn default_gateway(ssl: bool) -> Gateway {
	Gateway {
		bind_address: GATEWAY_BIND_ADDRESS.to_string(),
		bind_port: if ssl { HTTPS_BIND_PORT } else { HTTP_BIND_PORT },
		ssl,
		proxy_names: vec![GATEWAY_PROXY_NAME.to_string()],
		use_proxy_proto: Some(false),
		http_gateway: Some(HttpGateway::default()),
		..Default::default()
	}
}

#[rstest]
#[case::http(GATEWAY_PROXY_NAME, false)]
#[case::https("gateway-proxy-ssl", true)]
fn default_gateways(#[case] name: &str, #[case] ssl: bool) -> TestResult {
	let manifest = render(&request())?;

	let gateway = manifest.expect_custom_resource::<Gateway>(NAMESPACE, name)?;
	assert_eq!(gateway.spec, default_gateway(ssl));
	assert_eq!(gateway.metadata.namespace, NAMESPACE);
	assert_eq!(gateway.status, None);
	Ok(())
}

#[test]
fn generated_gateways_can_be_disabled() -> TestResult {
	let manifest = render_with(&[(
		"gatewayProxies.gatewayProxy.gatewaySettings.disableGeneratedGateways",
		"true",
	)])?;

	manifest.expect_absent("Gateway", NAMESPACE, GATEWAY_PROXY_NAME)?;
	manifest.expect_absent("Gateway", NAMESPACE, "gateway-proxy-ssl")?;
	manifest.expect_present("Deployment", NAMESPACE, GATEWAY_PROXY_NAME)?;
	Ok(())
}

#[test]
fn custom_gateways_from_values_file() -> TestResult {
	let request = request().values(fixture_path("custom-gateways-values.yaml"));
	let manifest = render(&request)?;

	let http = manifest.expect_custom_resource::<Gateway>(NAMESPACE, GATEWAY_PROXY_NAME)?;
	assert_eq!(
		http.spec,
		Gateway {
			use_proxy_proto: Some(true),
			http_gateway: Some(HttpGateway {
				virtual_services: vec![ResourceRef::new("petstore", "default")],
			}),
			..default_gateway(false)
		}
	);

	let https = manifest.expect_custom_resource::<Gateway>(NAMESPACE, "gateway-proxy-ssl")?;
	assert_eq!(
		https.spec.http_gateway,
		Some(HttpGateway {
			virtual_services: vec![ResourceRef::new("petstore-tls", "secure")],
		})
	);
	assert_eq!(https.spec.use_proxy_proto, Some(true));
	Ok(())
}

#[test]
fn wrong_custom_resource_kind_is_a_conversion_error() -> TestResult {
	let manifest = render(&request())?;
	let doc = manifest.expect_present("Settings", NAMESPACE, "default")?;

	assert_matches!(
		chart_manifest::convert::<Gateway>(doc),
		Err(ConversionError::KindMismatch { expected: "Gateway", .. })
	);
	// one failed conversion does not affect the next assertion
	manifest.expect_custom_resource::<Settings>(NAMESPACE, "default")?;
	assert_matches!(
		manifest.expect_custom_resource::<Gateway>(NAMESPACE, "missing"),
		Err(AssertError::Missing { .. })
	);
	Ok(())
}

#[test]
fn settings_converted() -> TestResult {
	let manifest = render(&RenderRequest::new(NAMESPACE))?;
	let settings = manifest.expect_custom_resource::<Settings>(NAMESPACE, "default")?;

	assert_eq!(
		settings.spec,
		Settings {
			discovery_namespace: NAMESPACE.to_string(),
			refresh_rate: Some("60s".to_string()),
			xds_bind_addr: Some("0.0.0.0:9977".to_string()),
			proxy_validation_server_addr: Some("gloo:9988".to_string()),
			always_accept: Some(true),
			read_gateways_from_all_namespaces: false,
			invalid_route_response_code: Some(404),
			invalid_route_response_body: Some(
				"Gloo Gateway has invalid configuration. Administrators should run `glooctl check` to find and fix config errors."
					.to_string()
			),
			sources: BTreeSet::from([
				"kubernetesArtifactSource".to_string(),
				"kubernetesConfigSource".to_string(),
				"kubernetesSecretSource".to_string(),
			]),
			discovery: None,
		}
	);
	Ok(())
}

#[test]
fn settings_follow_values() -> TestResult {
	let manifest = render_with(&[
		("gateway.readGatewaysFromAllNamespaces", "true"),
		("gateway.validation.alwaysAccept", "false"),
		("settings.refreshRate", "5s"),
	])?;
	let settings = manifest.expect_custom_resource::<Settings>(NAMESPACE, "default")?;

	assert!(settings.spec.read_gateways_from_all_namespaces);
	assert_eq!(settings.spec.always_accept, Some(false));
	assert_eq!(settings.spec.refresh_rate.as_deref(), Some("5s"));
	Ok(())
}

#[rstest]
#[case::settings(include_str!("../fixtures/settings.yaml"))]
#[case::validation_webhook(include_str!("../fixtures/validation-webhook.yaml"))]
#[case::certgen_job(include_str!("../fixtures/certgen-job.yaml"))]
#[case::certgen_cluster_role(include_str!("../fixtures/certgen-cluster-role.yaml"))]
#[case::certgen_cluster_role_binding(include_str!("../fixtures/certgen-cluster-role-binding.yaml"))]
#[case::certgen_service_account(include_str!("../fixtures/certgen-service-account.yaml"))]
#[case::gateway_service(include_str!("../fixtures/gateway-service.yaml"))]
fn golden_fixtures(#[case] fixture: &str) -> TestResult {
	render(&request())?.expect_fixture(fixture)?;
	Ok(())
}

#[test]
fn webhook_failure_policy_follows_values() -> TestResult {
	let manifest = render_with(&[("gateway.validation.failurePolicy", "Fail")])?;
	let err = manifest
		.expect_fixture(include_str!("../fixtures/validation-webhook.yaml"))
		.unwrap_err();
	assert!(
		err.to_string()
			.contains(r#"webhooks[0].failurePolicy: expected "Ignore", found "Fail""#),
		"{err}"
	);
	Ok(())
}

#[test]
fn certgen_job_can_be_disabled() -> TestResult {
	let manifest = render_with(&[("gateway.certGenJob.enabled", "false")])?;

	manifest.expect_absent("Job", NAMESPACE, "gateway-certgen")?;
	manifest.expect_absent("ServiceAccount", NAMESPACE, "gateway-certgen")?;
	manifest.expect_absent(
		"ClusterRole",
		"",
		"gloo-gateway-secret-create-vwc-update-gloo-system",
	)?;
	// the webhook itself stays
	manifest.expect_fixture(include_str!("../fixtures/validation-webhook.yaml"))?;
	Ok(())
}
