//! Labels subcommand handler.

use std::io::Write;

use anyhow::{Context, Result};
use chart_manifest::{HelmRenderer, RenderRequest, Renderer};
use clap::Args;

use super::{load_manifest, ChartArgs};

#[derive(Args, Debug, Clone)]
pub struct LabelsArgs {
	/// Label every resource must carry, e.g. installationId
	pub key: String,

	#[command(flatten)]
	pub chart: ChartArgs,
}

/// Run the labels subcommand.
pub fn run<W: Write>(args: LabelsArgs, writer: W) -> Result<()> {
	let resolved = args.chart.resolve()?;
	let renderer = HelmRenderer::new(resolved.config);
	run_with(&renderer, &resolved.request, &args.key, writer)
}

/// Prints the single value `key` has across the manifest.
pub fn run_with<R: Renderer + ?Sized, W: Write>(
	renderer: &R,
	request: &RenderRequest,
	key: &str,
	mut writer: W,
) -> Result<()> {
	let manifest = load_manifest(renderer, request)?;
	let value = manifest
		.expect_label_everywhere(key)
		.with_context(|| format!("checking label `{key}`"))?;
	writeln!(writer, "{value}")?;
	writer.flush()?;
	Ok(())
}
