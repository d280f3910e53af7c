//! Assertions over a rendered manifest.
//!
//! Every assertion returns a `Result`, so a scenario can use `?` and get a
//! readable failure: a missing resource names its key, a mismatch carries the
//! path-qualified diff.

use std::fmt::{self, Write as _};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
	builder::BuildError,
	convert::{convert, ConversionError, CustomResourceShape, TypedResource},
	document::{ResourceDocument, ResourceKey},
	expected::{ExpectedError, ExpectedResource},
	manifest::RenderedManifest,
	matcher::{Diff, Matcher},
};

/// A document that failed a predicate, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateFailure {
	pub key: ResourceKey,
	pub message: String,
}

impl fmt::Display for PredicateFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.key, self.message)
	}
}

fn list(failures: &[PredicateFailure]) -> String {
	let mut out = String::new();
	for failure in failures {
		let _ = write!(out, "\n  {failure}");
	}
	out
}

#[derive(Debug, Error)]
pub enum AssertError {
	#[error("{key} not found in manifest")]
	Missing { key: ResourceKey },

	#[error("{key} is present but should not be rendered")]
	Unexpected { key: ResourceKey },

	#[error("{key} does not match the expected resource\n{diff}")]
	Mismatch { key: ResourceKey, diff: Box<Diff> },

	#[error("{} of {total} document(s) failed:{}", .failures.len(), list(.failures))]
	Predicate {
		total: usize,
		failures: Vec<PredicateFailure>,
	},

	#[error("invalid expected resource")]
	Expected(#[from] ExpectedError),

	#[error("building expected resource")]
	Build(#[from] BuildError),

	#[error("converting {key}")]
	Conversion {
		key: ResourceKey,
		#[source]
		source: ConversionError,
	},

	#[error("{key}: data entry `{entry}` is not valid YAML")]
	DataYaml {
		key: ResourceKey,
		entry: String,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("label `{label}` is `{first}` on {first_key} but `{other}` on {other_key}")]
	InconsistentLabel {
		label: String,
		first_key: ResourceKey,
		first: String,
		other_key: ResourceKey,
		other: String,
	},

	#[error("manifest contains no resources")]
	EmptyManifest,
}

impl RenderedManifest {
	/// Asserts that the resource named by `expected` is rendered and equal to it.
	pub fn expect(&self, expected: &ExpectedResource) -> Result<&ResourceDocument, AssertError> {
		self.expect_with(&Matcher::default(), expected)
	}

	pub fn expect_with(
		&self,
		matcher: &Matcher,
		expected: &ExpectedResource,
	) -> Result<&ResourceDocument, AssertError> {
		let key = expected.key()?;
		let actual = self
			.get_key(&key)
			.ok_or_else(|| AssertError::Missing { key: key.clone() })?;
		matcher
			.equal(actual, expected)
			.into_result()
			.map_err(|diff| AssertError::Mismatch {
				key,
				diff: Box::new(diff),
			})?;
		Ok(actual)
	}

	/// Asserts against a typed object, e.g. a builder-produced `Deployment`.
	pub fn expect_typed<T: Serialize>(&self, object: &T) -> Result<&ResourceDocument, AssertError> {
		self.expect(&ExpectedResource::typed(object)?)
	}

	/// Asserts against a single-document YAML fixture.
	pub fn expect_fixture(&self, yaml: &str) -> Result<&ResourceDocument, AssertError> {
		self.expect(&ExpectedResource::fixture(yaml)?)
	}

	pub fn expect_present(
		&self,
		kind: &str,
		namespace: &str,
		name: &str,
	) -> Result<&ResourceDocument, AssertError> {
		self.get(kind, namespace, name)
			.ok_or_else(|| AssertError::Missing {
				key: ResourceKey::new(kind, namespace, name),
			})
	}

	pub fn expect_absent(&self, kind: &str, namespace: &str, name: &str) -> Result<(), AssertError> {
		match self.get(kind, namespace, name) {
			Some(doc) => Err(AssertError::Unexpected {
				key: doc.key().clone(),
			}),
			None => Ok(()),
		}
	}

	/// Asserts that `predicate` holds for every document.
	///
	/// All documents are checked; the error lists every failure.
	pub fn expect_all<F>(&self, mut predicate: F) -> Result<(), AssertError>
	where
		F: FnMut(&ResourceDocument) -> Result<(), String>,
	{
		let failures: Vec<PredicateFailure> = self
			.iter()
			.filter_map(|doc| {
				predicate(doc).err().map(|message| PredicateFailure {
					key: doc.key().clone(),
					message,
				})
			})
			.collect();

		if failures.is_empty() {
			Ok(())
		} else {
			Err(AssertError::Predicate {
				total: self.count(),
				failures,
			})
		}
	}

	/// Asserts that every document carries `label` with one shared value, and
	/// returns that value.
	pub fn expect_label_everywhere(&self, label: &str) -> Result<String, AssertError> {
		let Some(first_doc) = self.iter().next() else {
			return Err(AssertError::EmptyManifest);
		};

		self.expect_all(|doc| match doc.label(label) {
			Some(_) => Ok(()),
			None => Err(format!("label `{label}` is missing")),
		})?;

		let first = first_doc.label(label).unwrap_or_default();
		if let Some(other_doc) = self.iter().find(|doc| doc.label(label) != Some(first)) {
			return Err(AssertError::InconsistentLabel {
				label: label.to_string(),
				first_key: first_doc.key().clone(),
				first: first.to_string(),
				other_key: other_doc.key().clone(),
				other: other_doc.label(label).unwrap_or_default().to_string(),
			});
		}
		debug!(label, value = first, "label is consistent across the manifest");
		Ok(first.to_string())
	}

	/// Like [`expect`](Self::expect) for a config map, except that every `data`
	/// entry is parsed as YAML and compared structurally.
	pub fn expect_config_map_with_yaml_data(
		&self,
		expected: &ExpectedResource,
	) -> Result<&ResourceDocument, AssertError> {
		let key = expected.key()?;
		let actual = self
			.get_key(&key)
			.ok_or_else(|| AssertError::Missing { key: key.clone() })?;

		let actual_tree = with_parsed_data(&key, actual.as_value())?;
		let expected_tree = with_parsed_data(&key, expected.as_value())?;
		Matcher::default()
			.compare_values(&actual_tree, &expected_tree)
			.into_result()
			.map_err(|diff| AssertError::Mismatch {
				key,
				diff: Box::new(diff),
			})?;
		Ok(actual)
	}

	/// Asserts that a custom resource is rendered and converts it.
	pub fn expect_custom_resource<T: CustomResourceShape>(
		&self,
		namespace: &str,
		name: &str,
	) -> Result<TypedResource<T>, AssertError> {
		let doc = self.expect_present(T::KIND, namespace, name)?;
		convert::<T>(doc).map_err(|source| AssertError::Conversion {
			key: doc.key().clone(),
			source,
		})
	}
}

fn with_parsed_data(key: &ResourceKey, tree: &Value) -> Result<Value, AssertError> {
	let mut tree = tree.clone();
	if let Some(Value::Object(data)) = tree.get_mut("data") {
		for (entry, value) in data.iter_mut() {
			if let Value::String(text) = value {
				let parsed: Value =
					serde_yaml::from_str(text).map_err(|source| AssertError::DataYaml {
						key: key.clone(),
						entry: entry.clone(),
						source,
					})?;
				*value = parsed;
			}
		}
	}
	Ok(tree)
}
