//! Assertions over rendered chart manifests.
//!
//! A scenario renders a chart through a [`Renderer`], parses the output into a
//! [`RenderedManifest`], and compares resources in it against
//! [`ExpectedResource`]s built from fixtures or from the [`builder`] defaults:
//!
//! ```no_run
//! use chart_manifest::{builder, render_manifest, HelmRenderer, RenderConfig, RenderRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = HelmRenderer::new(RenderConfig::default().from_env()?);
//! let manifest = render_manifest(&renderer, &RenderRequest::new("gloo-system"))?;
//!
//! let mut spec = builder::BuilderSpec::new("gloo-system", "discovery");
//! spec.containers.push(builder::ContainerSpec::quay("discovery", "1.0.0", vec![]));
//! manifest.expect_typed(&builder::deployment(&spec)?)?;
//! # Ok(())
//! # }
//! ```

pub mod assert;
pub mod builder;
pub mod convert;
pub mod document;
pub mod expected;
pub mod gateway;
pub mod labels;
pub mod manifest;
pub mod matcher;
pub mod normalize;
pub mod path;
pub mod render;
pub mod yaml;

pub use assert::{AssertError, PredicateFailure};
pub use builder::{BuildError, BuilderSpec};
pub use convert::{convert, ConversionError, CustomResourceShape, TypedResource};
pub use document::{DocumentError, ResourceDocument, ResourceKey};
pub use expected::{ExpectedError, ExpectedResource};
pub use labels::{merge_labels, LabelConflict, Labels};
pub use manifest::{parse, ParseError, RenderedManifest};
pub use matcher::{equal, Diff, DiffEntry, MatchMode, MatchOutcome, Matcher};
pub use normalize::Normalizer;
pub use path::FieldPath;
pub use render::{
	render_manifest, HelmRenderer, RenderConfig, RenderError, RenderRequest, Renderer,
	ScenarioError,
};
