//! Canonical form of resource trees.
//!
//! Kubernetes objects go through Go's JSON/YAML serialization before they end up
//! in a rendered chart, so two trees that differ only in serialization
//! artifacts describe the same object. [`Normalizer`] removes those artifacts:
//!
//! 1. an explicit `null` is the same as an absent key;
//! 2. a mapping entry holding a zero value (`false`, `0`, `""`, `[]`, `{}`) is
//!    the same as an absent key (`omitempty`), unless the key is
//!    presence-significant;
//! 3. zero-ness is judged on the value as written, so the string `"0"` is kept;
//! 4. integral numbers written as strings or floats become integers;
//! 5. sequence elements are never dropped, only whole sequences.
//!
//! Presence-significant keys model pointer fields (`*bool`, `*int32`) and
//! marker structs such as `emptyDir: {}`, whose zero value means something.
//!
//! `omitempty` applies to struct fields only. Free-form string maps (labels,
//! annotations, config map data, selectors) serialize every entry, so inside
//! them only `null` entries are dropped. The map itself is still omitted when
//! it ends up empty.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};

/// Keys whose zero value is distinct from their absence in the Kubernetes API
/// and in the gateway custom resources.
pub const PRESENCE_SIGNIFICANT_KEYS: &[&str] = &[
	"replicas",
	"allowPrivilegeEscalation",
	"readOnlyRootFilesystem",
	"runAsNonRoot",
	"runAsUser",
	"runAsGroup",
	"privileged",
	"defaultMode",
	"ttlSecondsAfterFinished",
	"automountServiceAccountToken",
	"emptyDir",
	"useProxyProto",
	"alwaysAccept",
	"kubernetesArtifactSource",
	"kubernetesConfigSource",
	"kubernetesSecretSource",
];

/// Keys holding `map[string]string` values, whose entries are kept even when empty.
pub const FREE_FORM_MAP_KEYS: &[&str] = &[
	"labels",
	"annotations",
	"data",
	"stringData",
	"binaryData",
	"matchLabels",
	"nodeSelector",
	"selector",
];

// A workload `selector` is a LabelSelector struct, a service `selector` a plain map.
const LABEL_SELECTOR_FIELDS: &[&str] = &["matchLabels", "matchExpressions"];

#[derive(Debug, Clone)]
pub struct Normalizer {
	presence_significant: BTreeSet<String>,
	free_form: BTreeSet<String>,
}

impl Default for Normalizer {
	fn default() -> Self {
		Self::with_presence_significant(PRESENCE_SIGNIFICANT_KEYS.iter().copied())
	}
}

impl Normalizer {
	pub fn with_presence_significant<I, S>(keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			presence_significant: keys.into_iter().map(Into::into).collect(),
			free_form: FREE_FORM_MAP_KEYS.iter().map(|k| (*k).to_string()).collect(),
		}
	}

	/// Marks `key` as holding a free-form map whose empty entries are significant.
	#[must_use]
	pub fn free_form_map(mut self, key: impl Into<String>) -> Self {
		self.free_form.insert(key.into());
		self
	}

	/// Adds a key to the presence-significant set.
	#[must_use]
	pub fn keep_zero(mut self, key: impl Into<String>) -> Self {
		self.presence_significant.insert(key.into());
		self
	}

	pub fn is_presence_significant(&self, key: &str) -> bool {
		self.presence_significant.contains(key)
	}

	/// Returns the canonical form of `value`. An absent tree is `Value::Null`.
	pub fn normalize(&self, value: &Value) -> Value {
		self.normalize_value(value, false)
	}

	fn normalize_value(&self, value: &Value, free_form: bool) -> Value {
		match value {
			Value::Object(map) => Value::Object(self.normalize_map(map, free_form)),
			Value::Array(items) => Value::Array(items.iter().map(|v| self.normalize(v)).collect()),
			scalar => canonical_scalar(scalar),
		}
	}

	fn is_free_form(&self, key: &str, value: &Value) -> bool {
		if !self.free_form.contains(key) {
			return false;
		}
		match value {
			Value::Object(map) if key == "selector" => {
				!LABEL_SELECTOR_FIELDS.iter().any(|field| map.contains_key(*field))
			}
			_ => true,
		}
	}

	fn normalize_map(&self, map: &Map<String, Value>, free_form: bool) -> Map<String, Value> {
		let mut keys: Vec<&String> = map.keys().collect();
		keys.sort();

		let mut out = Map::new();
		for key in keys {
			let original = &map[key];
			// Entries of a free-form map are values, not struct fields.
			let child_free_form = !free_form && self.is_free_form(key, original);
			let normalized = self.normalize_value(original, child_free_form);
			if normalized.is_null() {
				continue;
			}
			if !free_form && !self.is_presence_significant(key) && is_zero(original, &normalized) {
				continue;
			}
			out.insert(key.clone(), normalized);
		}
		out
	}
}

// Scalars are judged as written, collections after their own normalization.
fn is_zero(original: &Value, normalized: &Value) -> bool {
	match (original, normalized) {
		(Value::Bool(b), _) => !b,
		(Value::Number(n), _) => n.as_f64() == Some(0.0),
		(Value::String(s), _) => s.is_empty(),
		(_, Value::Array(items)) => items.is_empty(),
		(_, Value::Object(map)) => map.is_empty(),
		_ => false,
	}
}

fn canonical_scalar(value: &Value) -> Value {
	match value {
		Value::String(s) if is_integer_literal(s) => s
			.parse::<i64>()
			.map_or_else(|_| value.clone(), |n| Value::Number(n.into())),
		Value::Number(n) if n.is_f64() => integral(n).map_or_else(|| value.clone(), Value::Number),
		other => other.clone(),
	}
}

fn integral(n: &Number) -> Option<Number> {
	let f = n.as_f64()?;
	if f.fract() != 0.0 || f < i64::MIN as f64 || f > i64::MAX as f64 {
		return None;
	}
	Some(Number::from(f as i64))
}

fn is_integer_literal(s: &str) -> bool {
	let digits = s.strip_prefix('-').unwrap_or(s);
	match digits.as_bytes() {
		[] => false,
		[b'0'] => true,
		[b'0', ..] => false,
		bytes => bytes.iter().all(u8::is_ascii_digit),
	}
}

/// Canonical form under the default Kubernetes rules.
pub fn normalize(value: &Value) -> Value {
	Normalizer::default().normalize(value)
}
