use std::path::PathBuf;

use anyhow::{Context, Result};
use chart_manifest::{
	render::parse_set, render_manifest, RenderConfig, RenderRequest, RenderedManifest, Renderer,
};
use clap::Args;
use tracing::instrument;

use crate::config::{self, FileConfig};

pub mod compare;
pub mod get;
pub mod labels;
pub mod render;

pub mod util;

/// Namespace rendered into when neither a flag nor the config file names one.
pub const DEFAULT_NAMESPACE: &str = "gloo-system";

/// Flags shared by every subcommand: where the chart is and how to render it.
#[derive(Args, Debug, Clone, Default)]
pub struct ChartArgs {
	/// Chart directory or archive
	#[arg(long)]
	pub chart: Option<PathBuf>,

	/// Release name
	#[arg(long)]
	pub release: Option<String>,

	/// Namespace to render into
	#[arg(short = 'n', long)]
	pub namespace: Option<String>,

	/// Override a chart value (Format: key=value). Repeatable; later flags win
	#[arg(long = "set", value_name = "KEY=VALUE")]
	pub set: Vec<String>,

	/// Values file passed to the renderer
	#[arg(short = 'f', long)]
	pub values: Option<PathBuf>,

	/// Installation id to render with. The chart generates one when omitted
	#[arg(long)]
	pub install_id: Option<String>,

	/// Seconds to wait for the renderer before giving up
	#[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
	pub timeout: Option<u64>,

	/// Path to the helm binary
	#[arg(long)]
	pub helm: Option<PathBuf>,

	/// TOML file with defaults for these flags
	#[arg(long)]
	pub config: Option<PathBuf>,
}

/// Render settings after merging defaults, the config file, the environment
/// and flags, in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
	pub config: RenderConfig,
	pub request: RenderRequest,
}

impl ChartArgs {
	pub fn resolve(&self) -> Result<Resolved> {
		self.resolve_with_env(|var| std::env::var(var).ok())
	}

	pub fn resolve_with_env<F>(&self, lookup: F) -> Result<Resolved>
	where
		F: Fn(&str) -> Option<String>,
	{
		let file = match &self.config {
			Some(path) => config::load(path)?,
			None => FileConfig::default(),
		};

		let mut config = file
			.render
			.with_env(lookup)
			.context("applying CHART_CHECK_* overrides")?;
		if let Some(helm) = &self.helm {
			config.helm.clone_from(helm);
		}
		if let Some(chart) = &self.chart {
			config.chart.clone_from(chart);
		}
		if let Some(release) = &self.release {
			config.release.clone_from(release);
		}
		if let Some(timeout) = self.timeout {
			config.timeout_secs = timeout;
		}

		let namespace = self
			.namespace
			.clone()
			.or(file.namespace)
			.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
		let mut request = RenderRequest::new(namespace);
		if let Some(id) = self.install_id.clone().or(file.installation_id) {
			request = request.installation_id(id);
		}
		if let Some(values) = self.values.clone().or(file.values) {
			request = request.values(values);
		}
		for (key, value) in file.set {
			request = request.set(key, value);
		}
		for raw in &self.set {
			let (key, value) = parse_set(raw).with_context(|| format!("invalid --set {raw:?}"))?;
			request = request.set(key, value);
		}
		Ok(Resolved { config, request })
	}
}

/// Renders and parses, naming the namespace in errors.
#[instrument(skip_all, fields(namespace = %request.namespace))]
pub fn load_manifest<R: Renderer + ?Sized>(
	renderer: &R,
	request: &RenderRequest,
) -> Result<RenderedManifest> {
	render_manifest(renderer, request)
		.with_context(|| format!("rendering chart into namespace {}", request.namespace))
}
