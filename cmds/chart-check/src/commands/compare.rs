//! Compare subcommand handler.

use std::{fs, io::Write, path::PathBuf};

use anyhow::{bail, Context, Result};
use chart_manifest::{AssertError, ExpectedResource, HelmRenderer, Matcher, RenderRequest, Renderer};
use clap::Args;

use super::{load_manifest, ChartArgs};

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
	/// YAML file holding the expected resource
	pub fixture: PathBuf,

	#[command(flatten)]
	pub chart: ChartArgs,

	/// Only compare fields present in the fixture
	#[arg(long)]
	pub subset: bool,
}

/// Run the compare subcommand.
pub fn run<W: Write>(args: CompareArgs, writer: W) -> Result<()> {
	let resolved = args.chart.resolve()?;
	let renderer = HelmRenderer::new(resolved.config);
	run_with(&renderer, &resolved.request, &args, writer)
}

/// Compares the rendered resource with the fixture. On a mismatch the diff is
/// written to `writer` and an error returned, so the process exits non-zero.
pub fn run_with<R: Renderer + ?Sized, W: Write>(
	renderer: &R,
	request: &RenderRequest,
	args: &CompareArgs,
	mut writer: W,
) -> Result<()> {
	let fixture = args.fixture.display();
	let raw = fs::read_to_string(&args.fixture).with_context(|| format!("reading {fixture}"))?;
	let expected = ExpectedResource::fixture(&raw).with_context(|| format!("loading {fixture}"))?;

	let manifest = load_manifest(renderer, request)?;
	let matcher = if args.subset {
		Matcher::subset()
	} else {
		Matcher::default()
	};

	match manifest.expect_with(&matcher, &expected) {
		Ok(doc) => {
			writeln!(writer, "{} matches {fixture}", doc.key())?;
			writer.flush()?;
			Ok(())
		}
		Err(AssertError::Mismatch { key, diff }) => {
			write!(writer, "{diff}")?;
			writer.flush()?;
			bail!("{key} does not match {fixture}")
		}
		Err(err) => Err(err).with_context(|| format!("comparing against {fixture}")),
	}
}
