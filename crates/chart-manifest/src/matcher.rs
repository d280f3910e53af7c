//! Structural comparison of rendered documents against expectations.

use std::fmt;

use serde_json::Value;
use similar::TextDiff;
use tracing::{debug, instrument};

use crate::{
	document::ResourceDocument, expected::ExpectedResource, normalize::Normalizer,
	path::FieldPath, yaml,
};

/// One differing field.
///
/// `None` means the field is absent on that side after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
	pub path: FieldPath,
	pub expected: Option<Value>,
	pub actual: Option<Value>,
}

impl fmt::Display for DiffEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}: expected {}, found {}",
			self.path,
			show(self.expected.as_ref()),
			show(self.actual.as_ref())
		)
	}
}

fn show(value: Option<&Value>) -> String {
	value.map_or_else(|| "<absent>".to_string(), Value::to_string)
}

/// Every difference between two normalized trees.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
	entries: Vec<DiffEntry>,
	expected: Value,
	actual: Value,
}

impl Diff {
	pub fn entries(&self) -> &[DiffEntry] {
		&self.entries
	}

	/// Entry for an exact path, if that field differs.
	pub fn entry(&self, path: &str) -> Option<&DiffEntry> {
		self.entries.iter().find(|e| e.path.to_string() == path)
	}

	pub fn paths(&self) -> Vec<String> {
		self.entries.iter().map(|e| e.path.to_string()).collect()
	}

	/// Unified diff of the two normalized trees printed as YAML.
	pub fn unified(&self) -> String {
		let expected = render(&self.expected);
		let actual = render(&self.actual);
		TextDiff::from_lines(&expected, &actual)
			.unified_diff()
			.context_radius(3)
			.header("expected", "actual")
			.to_string()
	}
}

fn render(value: &Value) -> String {
	yaml::to_yaml(value).unwrap_or_else(|e| format!("<unprintable: {e}>\n"))
}

impl fmt::Display for Diff {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{} field(s) differ:", self.entries.len())?;
		for entry in &self.entries {
			writeln!(f, "  {entry}")?;
		}
		write!(f, "{}", self.unified())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
	Match,
	Diff(Diff),
}

impl MatchOutcome {
	pub fn is_match(&self) -> bool {
		matches!(self, Self::Match)
	}

	pub fn diff(&self) -> Option<&Diff> {
		match self {
			Self::Match => None,
			Self::Diff(diff) => Some(diff),
		}
	}

	pub fn into_result(self) -> Result<(), Diff> {
		match self {
			Self::Match => Ok(()),
			Self::Diff(diff) => Err(diff),
		}
	}
}

/// How mapping keys missing from the expectation are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
	/// Both sides must have the same keys.
	#[default]
	Exact,
	/// Keys the expectation does not mention are ignored, at any depth.
	/// Sequences still compare by length.
	Subset,
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
	normalizer: Normalizer,
	mode: MatchMode,
}

impl Matcher {
	pub fn new(normalizer: Normalizer) -> Self {
		Self {
			normalizer,
			mode: MatchMode::Exact,
		}
	}

	/// Matcher that only checks the fields an expectation mentions.
	pub fn subset() -> Self {
		Self::default().with_mode(MatchMode::Subset)
	}

	#[must_use]
	pub fn with_mode(mut self, mode: MatchMode) -> Self {
		self.mode = mode;
		self
	}

	pub fn normalizer(&self) -> &Normalizer {
		&self.normalizer
	}

	/// Compares a rendered document against an expectation.
	#[instrument(skip_all, fields(key = %actual.key()))]
	pub fn equal(&self, actual: &ResourceDocument, expected: &ExpectedResource) -> MatchOutcome {
		self.compare_values(actual.as_value(), expected.as_value())
	}

	/// Compares two arbitrary trees after normalizing both.
	pub fn compare_values(&self, actual: &Value, expected: &Value) -> MatchOutcome {
		let actual = self.normalizer.normalize(actual);
		let expected = self.normalizer.normalize(expected);

		let mut entries = Vec::new();
		self.walk(
			&FieldPath::root(),
			present(&expected),
			present(&actual),
			&mut entries,
		);

		if entries.is_empty() {
			return MatchOutcome::Match;
		}
		debug!(differences = entries.len(), "documents differ");

		let actual = match self.mode {
			MatchMode::Exact => actual,
			MatchMode::Subset => project(&actual, &expected),
		};
		MatchOutcome::Diff(Diff {
			entries,
			expected,
			actual,
		})
	}

	fn walk(
		&self,
		path: &FieldPath,
		expected: Option<&Value>,
		actual: Option<&Value>,
		out: &mut Vec<DiffEntry>,
	) {
		match (expected, actual) {
			(Some(Value::Object(e)), Some(Value::Object(a))) => {
				let mut keys: Vec<&String> = e.keys().collect();
				if self.mode == MatchMode::Exact {
					keys.extend(a.keys().filter(|k| !e.contains_key(*k)));
				}
				keys.sort();
				for key in keys {
					self.walk(&path.key(key.clone()), e.get(key), a.get(key), out);
				}
			}
			(Some(Value::Array(e)), Some(Value::Array(a))) => {
				for (i, expected) in e.iter().enumerate() {
					self.walk(&path.index(i), Some(expected), a.get(i), out);
				}
				for (i, actual) in a.iter().enumerate().skip(e.len()) {
					out.push(DiffEntry {
						path: path.index(i),
						expected: None,
						actual: Some(actual.clone()),
					});
				}
			}
			(None, None) => {}
			(None, Some(_)) if self.mode == MatchMode::Subset => {}
			(e, a) if e == a => {}
			(e, a) => out.push(DiffEntry {
				path: path.clone(),
				expected: e.cloned(),
				actual: a.cloned(),
			}),
		}
	}
}

// The root of an empty tree normalizes to an empty mapping, which still counts as present.
fn present(value: &Value) -> Option<&Value> {
	(!value.is_null()).then_some(value)
}

// Restricts `actual` to the keys `expected` mentions, so subset diffs stay readable.
fn project(actual: &Value, expected: &Value) -> Value {
	match (actual, expected) {
		(Value::Object(a), Value::Object(e)) => Value::Object(
			e.iter()
				.filter_map(|(k, ev)| a.get(k).map(|av| (k.clone(), project(av, ev))))
				.collect(),
		),
		(Value::Array(a), Value::Array(e)) => Value::Array(
			a.iter()
				.enumerate()
				.map(|(i, av)| e.get(i).map_or_else(|| av.clone(), |ev| project(av, ev)))
				.collect(),
		),
		_ => actual.clone(),
	}
}

/// Compares with the default Kubernetes normalization rules.
pub fn equal(actual: &ResourceDocument, expected: &ExpectedResource) -> MatchOutcome {
	Matcher::default().equal(actual, expected)
}
