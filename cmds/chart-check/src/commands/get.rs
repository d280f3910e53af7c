//! Get subcommand handler.

use std::io::Write;

use anyhow::{bail, Context, Result};
use chart_manifest::{yaml, HelmRenderer, RenderRequest, Renderer, ResourceKey};
use clap::Args;
use tracing::warn;

use super::{load_manifest, ChartArgs};

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
	/// Resource kind, e.g. Deployment
	pub kind: String,

	/// Resource name
	pub name: String,

	#[command(flatten)]
	pub chart: ChartArgs,

	/// JSON output
	#[arg(long)]
	pub json: bool,
}

/// Run the get subcommand.
pub fn run<W: Write>(args: GetArgs, writer: W) -> Result<()> {
	let resolved = args.chart.resolve()?;
	let renderer = HelmRenderer::new(resolved.config);
	run_with(&renderer, &resolved.request, &args, writer)
}

/// Prints the resource named by `args`. The render namespace is tried first,
/// then the cluster scope.
pub fn run_with<R: Renderer + ?Sized, W: Write>(
	renderer: &R,
	request: &RenderRequest,
	args: &GetArgs,
	mut writer: W,
) -> Result<()> {
	let manifest = load_manifest(renderer, request)?;

	let namespaced = ResourceKey::new(args.kind.as_str(), &request.namespace, args.name.as_str());
	let cluster = ResourceKey::cluster(args.kind.as_str(), args.name.as_str());
	let Some(key) = [namespaced, cluster]
		.into_iter()
		.find(|key| manifest.get_key(key).is_some())
	else {
		bail!(
			"{} {} not found in namespace {} or at cluster scope",
			args.kind,
			args.name,
			request.namespace
		);
	};

	let matches = manifest.get_all(&key.kind, key.namespace(), &key.name);
	if matches.len() > 1 {
		warn!(%key, count = matches.len(), "printing the first of several documents with this key");
	}
	let doc = matches[0];

	if args.json {
		serde_json::to_writer_pretty(&mut writer, doc.as_value())?;
		writeln!(writer)?;
	} else {
		let text = yaml::to_yaml(doc.as_value()).with_context(|| format!("printing {key}"))?;
		writer.write_all(text.as_bytes())?;
	}
	writer.flush()?;
	Ok(())
}
