//! Typed views of custom resources.
//!
//! A custom resource's `spec` is read through an explicit table of
//! [`FieldMapping`]s: each entry names a dotted path below `spec` and a function
//! that stores the value into the typed shape. Nothing is guessed from field
//! names, so a typo in a chart shows up as an unknown or missing field instead
//! of a silently defaulted one. Unknown keys are rejected at every level a
//! mapping reaches through, and a parent that is not a mapping is a type error.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
	document::{type_name, ResourceDocument},
	labels::Labels,
	path::FieldPath,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
	#[error("expected a {expected} resource, found {found}")]
	KindMismatch {
		expected: &'static str,
		found: String,
	},

	#[error("{path}: expected {expected}, found {found}")]
	WrongType {
		path: FieldPath,
		expected: &'static str,
		found: &'static str,
	},

	#[error("{path}: required field is missing")]
	MissingField { path: FieldPath },

	#[error("{path}: unknown field")]
	UnknownField { path: FieldPath },

	#[error("{path}: value {value} is out of range")]
	OutOfRange { path: FieldPath, value: String },
}

impl ConversionError {
	/// Path of the offending field, if the error is about one.
	pub fn path(&self) -> Option<&FieldPath> {
		match self {
			Self::KindMismatch { .. } => None,
			Self::WrongType { path, .. }
			| Self::MissingField { path }
			| Self::UnknownField { path }
			| Self::OutOfRange { path, .. } => Some(path),
		}
	}
}

/// Stores one field of a `spec` into a typed shape.
pub type ApplyFn<T> = fn(&mut T, &Value, &FieldPath) -> Result<(), ConversionError>;

pub struct FieldMapping<T> {
	/// Dotted path below `spec`, e.g. `gloo.xdsBindAddr`.
	pub path: &'static str,
	pub required: bool,
	pub apply: ApplyFn<T>,
}

impl<T> FieldMapping<T> {
	pub const fn required(path: &'static str, apply: ApplyFn<T>) -> Self {
		Self {
			path,
			required: true,
			apply,
		}
	}

	pub const fn optional(path: &'static str, apply: ApplyFn<T>) -> Self {
		Self {
			path,
			required: false,
			apply,
		}
	}

}

// Every dotted parent of the mapped paths ("" is `spec` itself) with the keys mapped below it.
fn mapped_children<T>(
	fields: &'static [FieldMapping<T>],
) -> BTreeMap<&'static str, BTreeSet<&'static str>> {
	let mut children: BTreeMap<&'static str, BTreeSet<&'static str>> = BTreeMap::new();
	for field in fields {
		let mut start = 0;
		for segment in field.path.split('.') {
			let parent = field.path[..start].trim_end_matches('.');
			children.entry(parent).or_default().insert(segment);
			start += segment.len() + 1;
		}
	}
	children
}

/// A domain type a custom resource `spec` converts into.
pub trait CustomResourceShape: Default + Sized + 'static {
	const KIND: &'static str;

	/// Reject `spec` keys no mapping mentions, at every level the mappings reach.
	const STRICT: bool = true;

	fn fields() -> &'static [FieldMapping<Self>];
}

/// Metadata of a converted resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
	pub name: String,
	pub namespace: String,
	pub labels: Labels,
	pub annotations: Labels,
}

/// Generic `status` block of a custom resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStatus {
	pub state: Option<String>,
	pub reason: Option<String>,
	pub reported_by: Option<String>,
	/// Everything else, kept as written.
	pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedResource<T> {
	pub metadata: Metadata,
	pub spec: T,
	pub status: Option<ResourceStatus>,
}

/// Converts a rendered custom resource into its typed view.
#[instrument(skip_all, fields(kind = T::KIND, name = doc.name()))]
pub fn convert<T: CustomResourceShape>(
	doc: &ResourceDocument,
) -> Result<TypedResource<T>, ConversionError> {
	if doc.kind() != T::KIND {
		return Err(ConversionError::KindMismatch {
			expected: T::KIND,
			found: doc.kind().to_string(),
		});
	}

	let spec_path = FieldPath::root().key("spec");
	let empty = Map::new();
	let spec = match doc.pointer("/spec") {
		None | Some(Value::Null) => &empty,
		Some(value) => as_map(value, &spec_path)?,
	};

	if T::STRICT {
		reject_unknown(T::fields(), spec, &spec_path)?;
	}

	let mut shape = T::default();
	for field in T::fields() {
		let path = spec_path.join(&FieldPath::dotted(field.path));
		match lookup(spec, field.path, &spec_path)? {
			Some(value) => (field.apply)(&mut shape, value, &path)?,
			None if field.required => return Err(ConversionError::MissingField { path }),
			None => {}
		}
	}

	let status = match doc.pointer("/status") {
		None | Some(Value::Null) => None,
		Some(value) => Some(status(value)?),
	};
	debug!("converted custom resource");

	Ok(TypedResource {
		metadata: Metadata {
			name: doc.name().to_string(),
			namespace: doc.namespace().to_string(),
			labels: doc.labels(),
			annotations: doc.annotations(),
		},
		spec: shape,
		status,
	})
}

fn reject_unknown<T>(
	fields: &'static [FieldMapping<T>],
	spec: &Map<String, Value>,
	spec_path: &FieldPath,
) -> Result<(), ConversionError> {
	let leaves: BTreeSet<&str> = fields.iter().map(|f| f.path).collect();
	for (parent, known) in mapped_children(fields) {
		// A mapped leaf owns its whole subtree.
		if leaves.contains(parent) {
			continue;
		}
		let parent_path = spec_path.join(&FieldPath::dotted(parent));
		let map = if parent.is_empty() {
			spec
		} else {
			match lookup(spec, parent, spec_path)? {
				None => continue,
				Some(value) => as_map(value, &parent_path)?,
			}
		};
		if let Some(unknown) = map.keys().find(|k| !known.contains(k.as_str())) {
			return Err(ConversionError::UnknownField {
				path: parent_path.key(unknown.clone()),
			});
		}
	}
	Ok(())
}

// Null counts as absent at any depth. Any other parent that is not a mapping is a type error.
fn lookup<'a>(
	spec: &'a Map<String, Value>,
	dotted: &str,
	spec_path: &FieldPath,
) -> Result<Option<&'a Value>, ConversionError> {
	let mut current = spec;
	let mut path = spec_path.clone();
	let mut segments = dotted.split('.').peekable();
	while let Some(segment) = segments.next() {
		path = path.key(segment);
		let value = match current.get(segment) {
			None | Some(Value::Null) => return Ok(None),
			Some(value) => value,
		};
		if segments.peek().is_none() {
			return Ok(Some(value));
		}
		current = as_map(value, &path)?;
	}
	Ok(None)
}

fn status(value: &Value) -> Result<ResourceStatus, ConversionError> {
	let path = FieldPath::root().key("status");
	let mut extra = as_map(value, &path)?.clone();
	let mut take = |key: &str| -> Result<Option<String>, ConversionError> {
		match extra.shift_remove(key) {
			None | Some(Value::Null) => Ok(None),
			Some(Value::String(s)) => Ok(Some(s)),
			// Proto enums may be written as their number.
			Some(Value::Number(n)) => Ok(Some(n.to_string())),
			Some(other) => Err(wrong_type(&path.key(key), "string", &other)),
		}
	};

	let state = take("state")?;
	let reason = take("reason")?;
	let reported_by = take("reportedBy")?;

	Ok(ResourceStatus {
		state,
		reason,
		reported_by,
		extra,
	})
}

fn wrong_type(path: &FieldPath, expected: &'static str, found: &Value) -> ConversionError {
	ConversionError::WrongType {
		path: path.clone(),
		expected,
		found: type_name(found),
	}
}

pub fn as_map<'a>(value: &'a Value, path: &FieldPath) -> Result<&'a Map<String, Value>, ConversionError> {
	value
		.as_object()
		.ok_or_else(|| wrong_type(path, "mapping", value))
}

pub fn as_str<'a>(value: &'a Value, path: &FieldPath) -> Result<&'a str, ConversionError> {
	value.as_str().ok_or_else(|| wrong_type(path, "string", value))
}

pub fn as_string(value: &Value, path: &FieldPath) -> Result<String, ConversionError> {
	as_str(value, path).map(ToString::to_string)
}

pub fn as_bool(value: &Value, path: &FieldPath) -> Result<bool, ConversionError> {
	value.as_bool().ok_or_else(|| wrong_type(path, "boolean", value))
}

/// Proto `BoolValue` wrappers are written either as a bare boolean or as
/// `{value: bool}`.
pub fn as_bool_value(value: &Value, path: &FieldPath) -> Result<bool, ConversionError> {
	match value {
		Value::Bool(b) => Ok(*b),
		Value::Object(map) => match map.get("value") {
			None | Some(Value::Null) => Ok(false),
			Some(inner) => as_bool(inner, &path.key("value")),
		},
		other => Err(wrong_type(path, "boolean", other)),
	}
}

/// Unsigned 32 bit integer, written as a number or a numeric string.
pub fn as_u32(value: &Value, path: &FieldPath) -> Result<u32, ConversionError> {
	let out_of_range = || ConversionError::OutOfRange {
		path: path.clone(),
		value: value.to_string(),
	};
	match value {
		Value::Number(n) => n
			.as_u64()
			.and_then(|n| u32::try_from(n).ok())
			.ok_or_else(out_of_range),
		Value::String(s) => s
			.parse::<i64>()
			.map_err(|_| wrong_type(path, "integer", value))
			.and_then(|n| u32::try_from(n).map_err(|_| out_of_range())),
		other => Err(wrong_type(path, "integer", other)),
	}
}

pub fn as_string_list(value: &Value, path: &FieldPath) -> Result<Vec<String>, ConversionError> {
	let items = value
		.as_array()
		.ok_or_else(|| wrong_type(path, "sequence", value))?;
	items
		.iter()
		.enumerate()
		.map(|(i, item)| as_string(item, &path.index(i)))
		.collect()
}
