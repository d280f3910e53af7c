//! `--config` file support.
//!
//! A TOML file holding defaults for the render flags. Flags given on the
//! command line win over the file; `CHART_CHECK_*` variables sit in between.
//!
//! ```toml
//! namespace = "gloo-system"
//! values = "ci-values.yaml"
//!
//! [set]
//! "gloo.deployment.image.pullPolicy" = "Always"
//!
//! [render]
//! helm = "/usr/local/bin/helm"
//! chart = "install/helm/gloo"
//! timeout_secs = 120
//! ```
//!
//! Relative paths resolve against the working directory, like the flags.

use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chart_manifest::RenderConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
	pub namespace: Option<String>,
	pub installation_id: Option<String>,
	pub values: Option<PathBuf>,
	/// Value overrides, applied before any `--set` flag.
	pub set: BTreeMap<String, String>,
	pub render: RenderConfig,
}

pub fn parse(raw: &str) -> Result<FileConfig, toml::de::Error> {
	toml::from_str(raw)
}

pub fn load(path: &Path) -> Result<FileConfig> {
	let raw = fs::read_to_string(path)
		.with_context(|| format!("reading config file {}", path.display()))?;
	parse(&raw).with_context(|| format!("parsing config file {}", path.display()))
}
