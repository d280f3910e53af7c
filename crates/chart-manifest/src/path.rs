//! Field paths used to point at a location inside a resource tree.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
	Key(String),
	Index(usize),
}

/// Path from the document root to a nested field.
///
/// Displayed in the dotted form used by kubectl and friends:
/// `spec.template.spec.containers[0].image`. Keys that are not plain
/// identifiers are quoted: `metadata.annotations["prometheus.io/port"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
	pub fn root() -> Self {
		Self::default()
	}

	/// Parses a dotted path made only of keys, e.g. `spec.bindPort`.
	pub fn dotted(path: &str) -> Self {
		Self(
			path.split('.')
				.filter(|s| !s.is_empty())
				.map(|s| PathSegment::Key(s.to_string()))
				.collect(),
		)
	}

	#[must_use]
	pub fn key(&self, key: impl Into<String>) -> Self {
		let mut out = self.clone();
		out.0.push(PathSegment::Key(key.into()));
		out
	}

	#[must_use]
	pub fn index(&self, index: usize) -> Self {
		let mut out = self.clone();
		out.0.push(PathSegment::Index(index));
		out
	}

	#[must_use]
	pub fn join(&self, other: &Self) -> Self {
		let mut out = self.clone();
		out.0.extend(other.0.iter().cloned());
		out
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.0
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	/// Same location as a JSON pointer, for use with `Value::pointer`.
	pub fn to_pointer(&self) -> String {
		let mut out = String::new();
		for segment in &self.0 {
			out.push('/');
			match segment {
				PathSegment::Key(k) => out.push_str(&k.replace('~', "~0").replace('/', "~1")),
				PathSegment::Index(i) => out.push_str(&i.to_string()),
			}
		}
		out
	}
}

fn is_identifier(key: &str) -> bool {
	!key.is_empty()
		&& key
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for FieldPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return write!(f, "<root>");
		}
		for (i, segment) in self.0.iter().enumerate() {
			match segment {
				PathSegment::Key(k) if is_identifier(k) => {
					if i > 0 {
						write!(f, ".")?;
					}
					write!(f, "{k}")?;
				}
				PathSegment::Key(k) => write!(f, "[{k:?}]")?,
				PathSegment::Index(idx) => write!(f, "[{idx}]")?,
			}
		}
		Ok(())
	}
}
