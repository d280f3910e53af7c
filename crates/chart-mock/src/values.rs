//! Chart values: the defaults tree, values files and `--set` overrides.
//!
//! Layers are applied the way helm applies them: defaults, then the values
//! file, then every `--set` in order. A `null` in any overlay deletes the key
//! underneath it.

use std::{collections::BTreeMap, fs, path::Path};

use chart_manifest::{
	builder::{DEFAULT_PULL_POLICY, DEFAULT_REGISTRY},
	document::type_name,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

static NULL: Value = Value::Null;

#[derive(Debug, Error)]
pub enum ValuesError {
	#[error("reading values file {path}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("parsing values file {path}")]
	Parse {
		path: String,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("values file {path} must contain a mapping, found {found}")]
	NotAMapping { path: String, found: &'static str },

	#[error("cannot set `{key}`: `{segment}` is not a mapping")]
	NotATable { key: String, segment: String },

	#[error("empty segment in key `{0}`")]
	EmptyKey(String),
}

/// Values of a stock install.
pub fn defaults() -> Value {
	json!({
		"namespace": {"create": false},
		"global": {
			"image": {"registry": DEFAULT_REGISTRY, "pullPolicy": DEFAULT_PULL_POLICY}
		},
		"settings": {
			"refreshRate": "60s",
			"integrations": {"knative": {"enabled": false, "version": "0.8.0"}},
			"invalidConfigPolicy": {
				"invalidRouteResponseCode": 404,
				"invalidRouteResponseBody": "Gloo Gateway has invalid configuration. Administrators should run `glooctl check` to find and fix config errors."
			}
		},
		"gloo": {
			"deployment": {
				"image": {"repository": "gloo"},
				"xdsPort": 9977,
				"validationPort": 9988,
				"stats": true,
				"disableUsageStatistics": false,
				"resources": {"requests": {"memory": "256Mi", "cpu": "500m"}}
			}
		},
		"discovery": {
			"enabled": true,
			"deployment": {"image": {"repository": "discovery"}, "stats": true}
		},
		"ingress": {
			"enabled": false,
			"deployment": {"image": {"repository": "ingress"}, "replicas": 1}
		},
		"gateway": {
			"enabled": true,
			"readGatewaysFromAllNamespaces": false,
			"deployment": {"image": {"repository": "gateway"}, "stats": true},
			"validation": {
				"enabled": true,
				"secretName": "gateway-validation-certs",
				"alwaysAccept": true,
				"failurePolicy": "Ignore",
				"httpsPort": 8443
			},
			"certGenJob": {
				"enabled": true,
				"image": {"repository": "certgen"},
				"ttlSecondsAfterFinished": 60
			}
		},
		"gatewayProxies": {
			"gatewayProxy": {
				"kind": {"deployment": {"replicas": 1}},
				"podTemplate": {
					"image": {"repository": "gloo-envoy-wrapper"},
					"httpPort": 8080,
					"httpsPort": 8443,
					"disableNetBind": false,
					"runUnprivileged": false,
					"probes": false
				},
				"service": {"type": "LoadBalancer", "httpPort": 80, "httpsPort": 443},
				"stats": {"port": 8081},
				"readConfig": false,
				"gatewaySettings": {"disableGeneratedGateways": false, "useProxyProto": false}
			}
		},
		"accessLogger": {
			"enabled": false,
			"image": {"repository": "access-logger"},
			"port": 8083,
			"serviceName": "AccessLog"
		}
	})
}

/// Deep merges `overlay` into `base`; `null` entries delete keys.
pub fn merge_into(base: &mut Value, overlay: Value) {
	match (base, overlay) {
		(Value::Object(base), Value::Object(overlay)) => {
			for (key, value) in overlay {
				if value.is_null() {
					base.shift_remove(&key);
					continue;
				}
				match base.get_mut(&key) {
					Some(existing) => merge_into(existing, value),
					None => {
						base.insert(key, value);
					}
				}
			}
		}
		(base, overlay) => *base = overlay,
	}
}

/// Splits a `--set` key on dots; `\.` keeps a literal dot.
fn split_key(key: &str) -> Vec<String> {
	let mut segments = Vec::new();
	let mut current = String::new();
	let mut chars = key.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => {
				if let Some(next) = chars.next() {
					current.push(next);
				}
			}
			'.' => segments.push(std::mem::take(&mut current)),
			c => current.push(c),
		}
	}
	segments.push(current);
	segments
}

/// Types a `--set` value the way helm does.
fn typed(raw: &str) -> Value {
	match raw {
		"true" => Value::Bool(true),
		"false" => Value::Bool(false),
		"null" => Value::Null,
		_ => raw
			.parse::<i64>()
			.map_or_else(|_| Value::String(raw.to_string()), Value::from),
	}
}

fn scalar_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

/// The merged values tree of one render.
#[derive(Debug, Clone, PartialEq)]
pub struct Values(Value);

impl Default for Values {
	fn default() -> Self {
		Self(defaults())
	}
}

impl Values {
	pub fn from_value(tree: Value) -> Self {
		Self(tree)
	}

	pub fn merge(&mut self, overlay: Value) {
		merge_into(&mut self.0, overlay);
	}

	pub fn merge_file(&mut self, path: &Path) -> Result<(), ValuesError> {
		let display = path.display().to_string();
		let raw = fs::read_to_string(path).map_err(|source| ValuesError::Read {
			path: display.clone(),
			source,
		})?;
		let overlay: Value = serde_yaml::from_str(&raw).map_err(|source| ValuesError::Parse {
			path: display.clone(),
			source,
		})?;
		match overlay {
			Value::Null => Ok(()),
			Value::Object(_) => {
				self.merge(overlay);
				Ok(())
			}
			other => Err(ValuesError::NotAMapping {
				path: display,
				found: type_name(&other),
			}),
		}
	}

	/// Applies one `--set key=value`.
	pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ValuesError> {
		let segments = split_key(key);
		if segments.iter().any(String::is_empty) {
			return Err(ValuesError::EmptyKey(key.to_string()));
		}
		let Some((last, parents)) = segments.split_last() else {
			return Err(ValuesError::EmptyKey(key.to_string()));
		};

		let mut node = &mut self.0;
		for (depth, segment) in parents.iter().enumerate() {
			let Some(map) = node.as_object_mut() else {
				return Err(ValuesError::NotATable {
					key: key.to_string(),
					segment: parents[..depth].join("."),
				});
			};
			node = map
				.entry(segment.clone())
				.or_insert_with(|| Value::Object(Map::new()));
			if node.is_null() {
				*node = Value::Object(Map::new());
			}
		}

		let Some(map) = node.as_object_mut() else {
			return Err(ValuesError::NotATable {
				key: key.to_string(),
				segment: parents.join("."),
			});
		};
		match typed(raw) {
			Value::Null => {
				map.shift_remove(last);
			}
			value => {
				map.insert(last.clone(), value);
			}
		}
		Ok(())
	}

	pub fn root(&self) -> Scope<'_> {
		Scope(&self.0)
	}

	pub fn as_value(&self) -> &Value {
		&self.0
	}
}

/// Read-only view of a subtree; missing and `null` entries read as unset.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a>(&'a Value);

impl<'a> Scope<'a> {
	pub fn new(value: &'a Value) -> Self {
		Self(value)
	}

	pub fn get(self, path: &str) -> Option<&'a Value> {
		path.split('.')
			.try_fold(self.0, |node, key| node.get(key))
			.filter(|v| !v.is_null())
	}

	pub fn is_set(self, path: &str) -> bool {
		self.get(path).is_some()
	}

	/// Subtree at `path`; empty when unset.
	pub fn scope(self, path: &str) -> Self {
		Self(self.get(path).unwrap_or(&NULL))
	}

	pub fn str(self, path: &str) -> Option<&'a str> {
		self.get(path).and_then(Value::as_str)
	}

	/// Any scalar, stringified.
	pub fn string(self, path: &str) -> Option<String> {
		scalar_string(self.get(path)?)
	}

	pub fn bool(self, path: &str) -> bool {
		self.bool_or(path, false)
	}

	pub fn bool_or(self, path: &str, default: bool) -> bool {
		match self.get(path) {
			Some(Value::Bool(b)) => *b,
			Some(Value::String(s)) => s == "true",
			Some(_) => true,
			None => default,
		}
	}

	pub fn int(self, path: &str) -> Option<i64> {
		match self.get(path)? {
			Value::Number(n) => n.as_i64(),
			Value::String(s) => s.parse().ok(),
			_ => None,
		}
	}

	/// A mapping of scalars, e.g. extra annotations.
	pub fn string_map(self, path: &str) -> BTreeMap<String, String> {
		let Some(Value::Object(map)) = self.get(path) else {
			return BTreeMap::new();
		};
		map.iter()
			.filter_map(|(key, value)| Some((key.clone(), scalar_string(value)?)))
			.collect()
	}

	/// Entries of a mapping, in written order.
	pub fn entries(self, path: &str) -> Vec<(&'a str, Self)> {
		match self.get(path) {
			Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.as_str(), Self(v))).collect(),
			_ => Vec::new(),
		}
	}

	pub fn as_value(self) -> &'a Value {
		self.0
	}
}
