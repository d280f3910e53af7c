//! Render subcommand handler.

use std::io::Write;

use anyhow::{Context, Result};
use chart_manifest::{HelmRenderer, RenderRequest, Renderer};
use clap::Args;
use tabwriter::TabWriter;

use super::{load_manifest, util::namespace_column, ChartArgs};

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
	#[command(flatten)]
	pub chart: ChartArgs,

	/// Print the rendered stream instead of a resource table
	#[arg(long)]
	pub raw: bool,
}

/// Run the render subcommand.
pub fn run<W: Write>(args: RenderArgs, writer: W) -> Result<()> {
	let resolved = args.chart.resolve()?;
	let renderer = HelmRenderer::new(resolved.config);
	run_with(&renderer, &resolved.request, args.raw, writer)
}

pub fn run_with<R: Renderer + ?Sized, W: Write>(
	renderer: &R,
	request: &RenderRequest,
	raw: bool,
	mut writer: W,
) -> Result<()> {
	if raw {
		let stream = renderer.render(request).context("rendering chart")?;
		writer.write_all(stream.as_bytes())?;
		return Ok(writer.flush()?);
	}

	let manifest = load_manifest(renderer, request)?;
	let mut table = TabWriter::new(writer);
	writeln!(table, "KIND\tNAMESPACE\tNAME")?;
	for doc in manifest.iter() {
		writeln!(
			table,
			"{}\t{}\t{}",
			doc.kind(),
			namespace_column(doc.namespace()),
			doc.name()
		)?;
	}
	table.flush()?;
	Ok(())
}
