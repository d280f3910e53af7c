//! In-process stand-in for `helm template` on the gateway chart.
//!
//! [`GatewayChart`] implements [`Renderer`], so scenarios run without a helm
//! binary or a chart checkout. It understands the same request as
//! [`HelmRenderer`](chart_manifest::HelmRenderer): namespace, installation id,
//! `--set` overrides and a values file.

use std::fmt::Write as _;

use bon::Builder;
use chart_manifest::{RenderError, RenderRequest, Renderer};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

mod envoy;
pub mod templates;
pub mod values;

pub use templates::{Document, TemplateError, INSTALLATION_ID_LABEL};
pub use values::{Values, ValuesError};

pub const CHART_VERSION: &str = "1.0.0";
/// Values key holding the installation id.
pub const INSTALLATION_ID_KEY: &str = "global.glooInstallationId";

/// The gateway chart at one version.
#[derive(Debug, Clone, Builder)]
pub struct GatewayChart {
	#[builder(into, default = String::from(CHART_VERSION))]
	version: String,
	#[builder(into, default = String::from("gloo"))]
	release: String,
}

impl Default for GatewayChart {
	fn default() -> Self {
		Self::builder().build()
	}
}

/// Flattens an error and its sources into one line, the way helm reports
/// template failures.
fn template_error(err: &dyn std::error::Error) -> RenderError {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		let _ = write!(message, ": {cause}");
		source = cause.source();
	}
	RenderError::Template { message }
}

impl GatewayChart {
	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn release(&self) -> &str {
		&self.release
	}

	/// Values for a request: defaults, then the values file, then overrides.
	pub fn values(&self, request: &RenderRequest) -> Result<Values, ValuesError> {
		let mut values = Values::default();
		if let Some(path) = &request.values_file {
			values.merge_file(path)?;
		}
		if let Some(id) = &request.installation_id {
			values.set(INSTALLATION_ID_KEY, id)?;
		}
		for (key, value) in &request.set {
			values.set(key, value)?;
		}
		Ok(values)
	}

	/// Id the chart generates when none is configured; stable per release and
	/// namespace.
	pub fn generated_installation_id(&self, namespace: &str) -> String {
		let digest = Sha256::digest(format!("{}/{namespace}", self.release).as_bytes());
		format!("{digest:x}").chars().take(20).collect()
	}

	#[instrument(skip_all, fields(namespace = %request.namespace, overrides = request.set.len()))]
	pub fn documents(&self, request: &RenderRequest) -> Result<Vec<Document>, RenderError> {
		let values = self.values(request).map_err(|e| template_error(&e))?;
		let namespace = if request.namespace.is_empty() {
			"default"
		} else {
			request.namespace.as_str()
		};
		let installation_id = values
			.root()
			.string(INSTALLATION_ID_KEY)
			.filter(|id| !id.is_empty())
			.unwrap_or_else(|| self.generated_installation_id(namespace));

		let ctx = templates::Context {
			namespace,
			version: &self.version,
			installation_id: &installation_id,
			values: values.root(),
		};
		let documents = templates::render_all(&ctx).map_err(|e| template_error(&e))?;
		debug!(count = documents.len(), installation_id = %installation_id, "rendered chart");
		Ok(documents)
	}
}

impl Renderer for GatewayChart {
	fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
		let mut out = String::new();
		for doc in self.documents(request)? {
			let body = serde_yaml::to_string(&doc.body).map_err(|e| template_error(&e))?;
			let _ = write!(out, "---\n# Source: {}\n{body}", doc.source);
		}
		Ok(out)
	}
}
