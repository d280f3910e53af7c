//! YAML output with a stable key order.
//!
//! Trees built from typed objects and trees parsed from a chart list keys in
//! different orders. Sorting before serializing makes two equal trees print
//! identically, which keeps unified diffs down to the lines that changed.

use serde_json::{Map, Value};

/// Sorts mapping keys recursively.
pub fn sort_keys(value: &Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut entries: Vec<(&String, &Value)> = map.iter().collect();
			entries.sort_by(|(a, _), (b, _)| a.cmp(b));
			Value::Object(
				entries
					.into_iter()
					.map(|(k, v)| (k.clone(), sort_keys(v)))
					.collect::<Map<_, _>>(),
			)
		}
		Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
		other => other.clone(),
	}
}

/// Serializes a tree as a YAML document with sorted keys.
pub fn to_yaml(value: &Value) -> Result<String, serde_yaml::Error> {
	serde_yaml::to_string(&sort_keys(value))
}

/// Serializes several trees as one multi-document stream.
pub fn to_yaml_stream<'a, I>(values: I) -> Result<String, serde_yaml::Error>
where
	I: IntoIterator<Item = &'a Value>,
{
	let mut out = String::new();
	for value in values {
		out.push_str("---\n");
		out.push_str(&to_yaml(value)?);
	}
	Ok(out)
}
