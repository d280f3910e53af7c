mod common;

use chart_manifest::{parse, RenderRequest};
use chart_mock::{GatewayChart, INSTALLATION_ID_LABEL};
use common::*;

#[test]
fn installation_ids_differ_between_renders() -> TestResult {
	let first = render(&RenderRequest::new(NAMESPACE).installation_id("install-one"))?;
	let second = render(&RenderRequest::new(NAMESPACE).installation_id("install-two"))?;

	assert_eq!(first.expect_label_everywhere(INSTALLATION_ID_LABEL)?, "install-one");
	assert_eq!(second.expect_label_everywhere(INSTALLATION_ID_LABEL)?, "install-two");
	assert_eq!(first.count(), second.count());
	Ok(())
}

#[test]
fn omitted_installation_id_is_generated_once() -> TestResult {
	let manifest = render(&RenderRequest::new(NAMESPACE))?;

	let id = manifest.expect_label_everywhere(INSTALLATION_ID_LABEL)?;
	assert!(!id.is_empty());
	assert_eq!(id, GatewayChart::default().generated_installation_id(NAMESPACE));
	Ok(())
}

#[test]
fn installation_id_can_be_set_as_a_value() -> TestResult {
	let manifest = render(&RenderRequest::new(NAMESPACE).set("global.glooInstallationId", "from-set"))?;
	assert_eq!(manifest.expect_label_everywhere(INSTALLATION_ID_LABEL)?, "from-set");
	Ok(())
}

#[test]
fn every_resource_is_found_by_its_own_key() -> TestResult {
	let manifest = render_with(&[("accessLogger.enabled", "true"), ("namespace.create", "true")])?;
	assert!(manifest.duplicates().is_empty());

	for doc in manifest.iter() {
		let found = manifest
			.get(doc.kind(), doc.namespace(), doc.name())
			.ok_or_else(|| format!("{} not found", doc.key()))?;
		assert_eq!(found.kind(), doc.kind());
		assert_eq!(found.namespace(), doc.namespace());
		assert_eq!(found.name(), doc.name());
	}
	Ok(())
}

#[test]
fn parsing_is_deterministic() -> TestResult {
	let raw = chart_manifest::Renderer::render(&GatewayChart::default(), &request())?;
	let first = parse(&raw)?;
	let second = parse(&raw)?;

	assert_eq!(first.documents(), second.documents());
	assert_eq!(first.kinds(), second.kinds());
	Ok(())
}

#[test]
fn namespace_is_only_rendered_when_requested() -> TestResult {
	render(&request())?.expect_absent("Namespace", "", NAMESPACE)?;

	let manifest = render_with(&[("namespace.create", "true")])?;
	let namespace = manifest.expect_present("Namespace", "", NAMESPACE)?;
	assert_eq!(namespace.label(INSTALLATION_ID_LABEL), Some(INSTALL_ID));
	Ok(())
}

#[test]
fn kinds_of_the_default_render() -> TestResult {
	let manifest = render(&request())?;
	let kinds = manifest.kinds();

	assert_eq!(kinds["Deployment"], 4);
	assert_eq!(kinds["Service"], 3);
	assert_eq!(kinds["ServiceAccount"], 5);
	assert_eq!(kinds["Gateway"], 2);
	assert_eq!(kinds["Settings"], 1);
	assert_eq!(kinds["ConfigMap"], 1);
	assert_eq!(kinds["Job"], 1);
	assert!(!kinds.contains_key("Namespace"));
	Ok(())
}
