//! Parsing of rendered multi-document output into an indexed manifest.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::document::{DocumentError, ResourceDocument, ResourceKey};

/// A rendered stream could not be turned into resources.
///
/// `index` is the zero based position of the offending document within the
/// stream, counting empty documents.
#[derive(Debug, Error)]
pub enum ParseError {
	#[error("document {index}: invalid YAML")]
	Yaml {
		index: usize,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("document {index}: not a resource")]
	Document {
		index: usize,
		#[source]
		source: DocumentError,
	},
}

impl ParseError {
	pub fn index(&self) -> usize {
		match self {
			Self::Yaml { index, .. } | Self::Document { index, .. } => *index,
		}
	}
}

/// Resources of one render, in stream order, indexed by [`ResourceKey`].
///
/// The manifest never changes after it is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedManifest {
	documents: Vec<ResourceDocument>,
	index: BTreeMap<ResourceKey, Vec<usize>>,
}

/// Parses a multi-document YAML stream.
///
/// Empty documents, including those made only of comments such as the
/// `# Source:` headers helm writes, are skipped.
#[instrument(skip_all, fields(bytes = raw.len()))]
pub fn parse(raw: &str) -> Result<RenderedManifest, ParseError> {
	let mut documents = Vec::new();

	for (index, de) in serde_yaml::Deserializer::from_str(raw).enumerate() {
		let value = Value::deserialize(de).map_err(|source| ParseError::Yaml { index, source })?;
		if value.is_null() {
			debug!(index, "skipping empty document");
			continue;
		}
		let doc = ResourceDocument::from_value(value)
			.map_err(|source| ParseError::Document { index, source })?;
		debug!(index, key = %doc.key(), "parsed document");
		documents.push(doc);
	}

	let manifest = RenderedManifest::from_documents(documents);
	for key in manifest.duplicates() {
		warn!(%key, "resource key occurs more than once; lookups return the first occurrence");
	}
	debug!(count = manifest.count(), "parsed manifest");
	Ok(manifest)
}

impl RenderedManifest {
	pub fn from_documents(documents: Vec<ResourceDocument>) -> Self {
		let mut index: BTreeMap<ResourceKey, Vec<usize>> = BTreeMap::new();
		for (i, doc) in documents.iter().enumerate() {
			index.entry(doc.key().clone()).or_default().push(i);
		}
		Self { documents, index }
	}

	/// First document with the given kind, namespace and name.
	///
	/// Use an empty namespace for cluster scoped resources.
	pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<&ResourceDocument> {
		self.get_key(&ResourceKey::new(kind, namespace, name))
	}

	pub fn get_key(&self, key: &ResourceKey) -> Option<&ResourceDocument> {
		self.index
			.get(key)
			.and_then(|positions| positions.first())
			.map(|&i| &self.documents[i])
	}

	/// Every document with the given key, in stream order.
	pub fn get_all(&self, kind: &str, namespace: &str, name: &str) -> Vec<&ResourceDocument> {
		self.index
			.get(&ResourceKey::new(kind, namespace, name))
			.map(|positions| positions.iter().map(|&i| &self.documents[i]).collect())
			.unwrap_or_default()
	}

	pub fn count(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}

	/// Calls `visitor` on every document in stream order.
	pub fn for_each<F>(&self, visitor: F)
	where
		F: FnMut(&ResourceDocument),
	{
		self.documents.iter().for_each(visitor);
	}

	pub fn iter(&self) -> std::slice::Iter<'_, ResourceDocument> {
		self.documents.iter()
	}

	pub fn documents(&self) -> &[ResourceDocument] {
		&self.documents
	}

	/// Keys that occur more than once.
	pub fn duplicates(&self) -> Vec<&ResourceKey> {
		self.index
			.iter()
			.filter(|(_, positions)| positions.len() > 1)
			.map(|(key, _)| key)
			.collect()
	}

	/// Number of documents per kind.
	pub fn kinds(&self) -> BTreeMap<&str, usize> {
		let mut kinds = BTreeMap::new();
		for doc in &self.documents {
			*kinds.entry(doc.kind()).or_insert(0) += 1;
		}
		kinds
	}
}

impl<'a> IntoIterator for &'a RenderedManifest {
	type Item = &'a ResourceDocument;
	type IntoIter = std::slice::Iter<'a, ResourceDocument>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}
