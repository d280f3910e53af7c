//! Label maps and the merge used wherever two label sets are combined.

use std::collections::BTreeMap;

use thiserror::Error;

/// Labels and annotations, ordered by key so that output is stable.
pub type Labels = BTreeMap<String, String>;

/// Two label maps assign different values to the same key.
///
/// The reported key is the smallest conflicting key, and the two values are
/// ordered lexicographically, so the error does not depend on argument order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("label `{key}` has conflicting values `{left}` and `{right}`")]
pub struct LabelConflict {
	pub key: String,
	pub left: String,
	pub right: String,
}

/// Builds a label map from literal pairs.
pub fn labels<I, K, V>(pairs: I) -> Labels
where
	I: IntoIterator<Item = (K, V)>,
	K: Into<String>,
	V: Into<String>,
{
	pairs
		.into_iter()
		.map(|(k, v)| (k.into(), v.into()))
		.collect()
}

/// Union of two label maps.
///
/// Keys present in both maps must carry the same value. The operation is
/// commutative and associative, with the empty map as identity.
pub fn merge_labels(a: &Labels, b: &Labels) -> Result<Labels, LabelConflict> {
	let mut merged = a.clone();
	let mut conflict: Option<LabelConflict> = None;

	for (key, value) in b {
		match merged.get(key) {
			Some(existing) if existing != value => {
				if conflict.as_ref().is_none_or(|c| key < &c.key) {
					let (left, right) = if existing <= value {
						(existing.clone(), value.clone())
					} else {
						(value.clone(), existing.clone())
					};
					conflict = Some(LabelConflict {
						key: key.clone(),
						left,
						right,
					});
				}
			}
			Some(_) => {}
			None => {
				merged.insert(key.clone(), value.clone());
			}
		}
	}

	match conflict {
		Some(conflict) => Err(conflict),
		None => Ok(merged),
	}
}

/// Copy of `labels` with the given keys removed.
pub fn without_keys(labels: &Labels, keys: &[&str]) -> Labels {
	labels
		.iter()
		.filter(|(k, _)| !keys.contains(&k.as_str()))
		.map(|(k, v)| (k.clone(), v.clone()))
		.collect()
}
