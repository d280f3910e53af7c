//! Expected resources: the right-hand side of every assertion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::{DocumentError, ResourceDocument, ResourceKey};

#[derive(Debug, Error)]
pub enum ExpectedError {
	#[error("serializing expected resource")]
	Serialize(#[source] serde_json::Error),

	#[error("parsing fixture YAML")]
	Fixture(#[source] serde_yaml::Error),

	#[error("fixture contains no document")]
	EmptyFixture,

	#[error("fixture contains {count} documents, expected exactly one")]
	MultipleDocuments { count: usize },

	#[error("expected resource does not identify a resource")]
	Incomplete(#[source] DocumentError),

	#[error("cannot patch `{pointer}`: a parent is not a mapping or sequence")]
	PatchTarget { pointer: String },
}

/// Where an expected resource came from. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
	/// A typed object, e.g. a `k8s-openapi` Deployment, usually from the builder.
	Typed,
	/// A hand-written YAML fixture.
	Fixture,
	/// Another rendered document.
	Document,
}

/// Desired state of a resource.
///
/// Both typed objects and fixtures are reduced to the same generic tree, so
/// they are compared by exactly the same rules as the rendered document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedResource {
	origin: Origin,
	tree: Value,
}

impl ExpectedResource {
	/// Serializes any typed object into an expectation.
	pub fn typed<T: Serialize>(object: &T) -> Result<Self, ExpectedError> {
		let tree = serde_json::to_value(object).map_err(ExpectedError::Serialize)?;
		Ok(Self {
			origin: Origin::Typed,
			tree,
		})
	}

	/// Reads a single-document YAML fixture.
	pub fn fixture(yaml: &str) -> Result<Self, ExpectedError> {
		let mut documents = Vec::new();
		for de in serde_yaml::Deserializer::from_str(yaml) {
			let value = Value::deserialize(de).map_err(ExpectedError::Fixture)?;
			if !value.is_null() {
				documents.push(value);
			}
		}

		match documents.len() {
			0 => Err(ExpectedError::EmptyFixture),
			1 => Ok(Self {
				origin: Origin::Fixture,
				tree: documents.remove(0),
			}),
			count => Err(ExpectedError::MultipleDocuments { count }),
		}
	}

	pub fn from_document(doc: &ResourceDocument) -> Self {
		Self {
			origin: Origin::Document,
			tree: doc.as_value().clone(),
		}
	}

	pub fn from_value(tree: Value) -> Self {
		Self {
			origin: Origin::Fixture,
			tree,
		}
	}

	pub fn origin(&self) -> Origin {
		self.origin
	}

	pub fn as_value(&self) -> &Value {
		&self.tree
	}

	/// The resource this expectation is about.
	pub fn key(&self) -> Result<ResourceKey, ExpectedError> {
		ResourceDocument::from_value(self.tree.clone())
			.map(|doc| doc.key().clone())
			.map_err(ExpectedError::Incomplete)
	}

	/// Sets the field at a JSON pointer, creating intermediate mappings.
	pub fn with(mut self, pointer: &str, value: Value) -> Result<Self, ExpectedError> {
		let target = pointer_parent(&mut self.tree, pointer, true)
			.ok_or_else(|| ExpectedError::PatchTarget {
				pointer: pointer.to_string(),
			})?;
		match target {
			(Value::Object(map), last) => {
				map.insert(last, value);
			}
			(Value::Array(items), last) => {
				let index = last.parse::<usize>().ok().filter(|i| *i <= items.len());
				match index {
					Some(i) if i == items.len() => items.push(value),
					Some(i) => items[i] = value,
					None => {
						return Err(ExpectedError::PatchTarget {
							pointer: pointer.to_string(),
						})
					}
				}
			}
			_ => {
				return Err(ExpectedError::PatchTarget {
					pointer: pointer.to_string(),
				})
			}
		}
		Ok(self)
	}

	/// Removes the field at a JSON pointer if it exists.
	#[must_use]
	pub fn without(mut self, pointer: &str) -> Self {
		match pointer_parent(&mut self.tree, pointer, false) {
			Some((Value::Object(map), last)) => {
				map.shift_remove(&last);
			}
			Some((Value::Array(items), last)) => {
				if let Some(i) = last.parse::<usize>().ok().filter(|i| *i < items.len()) {
					items.remove(i);
				}
			}
			_ => {}
		}
		self
	}
}

fn unescape(token: &str) -> String {
	token.replace("~1", "/").replace("~0", "~")
}

// Walks to the parent of the pointer's last token.
fn pointer_parent<'a>(
	root: &'a mut Value,
	pointer: &str,
	create: bool,
) -> Option<(&'a mut Value, String)> {
	let rest = pointer.strip_prefix('/')?;
	let mut tokens: Vec<String> = rest.split('/').map(unescape).collect();
	let last = tokens.pop()?;

	let mut current = root;
	for token in tokens {
		current = match current {
			Value::Object(map) => {
				if create {
					map.entry(token)
						.or_insert_with(|| Value::Object(Map::new()))
				} else {
					map.get_mut(&token)?
				}
			}
			Value::Array(items) => items.get_mut(token.parse::<usize>().ok()?)?,
			_ => return None,
		};
		if create && current.is_null() {
			*current = Value::Object(Map::new());
		}
	}
	Some((current, last))
}
