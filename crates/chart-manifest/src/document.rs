//! Generic resource documents and the composite key they are indexed by.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::labels::Labels;

/// Reasons a parsed YAML value cannot become a [`ResourceDocument`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
	#[error("document must be a mapping, found {found}")]
	NotAMapping { found: &'static str },

	#[error("document is missing required field `{0}`")]
	MissingField(&'static str),
}

/// Human readable name of a value's type, used in error messages.
pub fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "sequence",
		Value::Object(_) => "mapping",
	}
}

/// Lookup key of a resource: kind, namespace and name.
///
/// Cluster scoped resources have no namespace. An empty namespace string is
/// treated the same as no namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
	pub kind: String,
	pub namespace: Option<String>,
	pub name: String,
}

impl ResourceKey {
	pub fn new(kind: impl Into<String>, namespace: &str, name: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
			name: name.into(),
		}
	}

	/// Key of a cluster scoped resource.
	pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
		Self::new(kind, "", name)
	}

	pub fn namespace(&self) -> &str {
		self.namespace.as_deref().unwrap_or_default()
	}
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
			None => write!(f, "{} {}", self.kind, self.name),
		}
	}
}

/// One resource out of a rendered stream.
///
/// The tree is kept exactly as it was parsed; accessors read from it without
/// copying. Kind and name are guaranteed to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
	key: ResourceKey,
	api_version: String,
	tree: Value,
}

impl ResourceDocument {
	/// Wraps a parsed value, validating that it looks like a resource.
	pub fn from_value(tree: Value) -> Result<Self, DocumentError> {
		let Value::Object(map) = &tree else {
			return Err(DocumentError::NotAMapping {
				found: type_name(&tree),
			});
		};

		let kind = non_empty_str(map.get("kind")).ok_or(DocumentError::MissingField("kind"))?;
		let metadata = map.get("metadata").and_then(Value::as_object);
		let name = non_empty_str(metadata.and_then(|m| m.get("name")))
			.ok_or(DocumentError::MissingField("metadata.name"))?;
		let namespace = metadata
			.and_then(|m| m.get("namespace"))
			.and_then(Value::as_str)
			.unwrap_or_default();
		let api_version = map
			.get("apiVersion")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();

		Ok(Self {
			key: ResourceKey::new(kind, namespace, name),
			api_version,
			tree,
		})
	}

	pub fn key(&self) -> &ResourceKey {
		&self.key
	}

	pub fn kind(&self) -> &str {
		&self.key.kind
	}

	pub fn name(&self) -> &str {
		&self.key.name
	}

	/// Namespace of the resource, empty for cluster scoped resources.
	pub fn namespace(&self) -> &str {
		self.key.namespace()
	}

	pub fn api_version(&self) -> &str {
		&self.api_version
	}

	pub fn labels(&self) -> Labels {
		self.string_map("/metadata/labels")
	}

	pub fn label(&self, key: &str) -> Option<&str> {
		self.metadata_entry("labels", key)
	}

	pub fn annotations(&self) -> Labels {
		self.string_map("/metadata/annotations")
	}

	pub fn annotation(&self, key: &str) -> Option<&str> {
		self.metadata_entry("annotations", key)
	}

	/// Looks up a nested field with a JSON pointer, e.g. `/spec/replicas`.
	pub fn pointer(&self, pointer: &str) -> Option<&Value> {
		self.tree.pointer(pointer)
	}

	pub fn as_value(&self) -> &Value {
		&self.tree
	}

	pub fn into_value(self) -> Value {
		self.tree
	}

	fn metadata_entry(&self, section: &str, key: &str) -> Option<&str> {
		self.tree
			.get("metadata")?
			.get(section)?
			.get(key)?
			.as_str()
	}

	fn string_map(&self, pointer: &str) -> Labels {
		self.tree
			.pointer(pointer)
			.and_then(Value::as_object)
			.map(string_entries)
			.unwrap_or_default()
	}
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
	value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

// Non-string label values are invalid in Kubernetes; they are skipped rather than coerced.
fn string_entries(map: &Map<String, Value>) -> Labels {
	map.iter()
		.filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
		.collect()
}
