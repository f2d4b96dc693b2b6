//! Tag maps: `dimension → set of values` classification for specs and impls.
//!
//! A tag map is stored as a one-level JSON object whose values are arrays of
//! strings. Values are kept sorted and deduplicated so that two maps holding
//! the same sets compare equal regardless of the order they were written in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Maximum number of distinct values per dimension.
pub const MAX_TAG_VALUES: usize = 64;

/// Spec-level dimensions served by the containment index.
pub const SPEC_TAG_DIMENSIONS: &[&str] =
  &["plot_type", "data_type", "domain", "features"];

/// Impl-level dimensions served by the containment index.
pub const IMPL_TAG_DIMENSIONS: &[&str] =
  &["dependencies", "techniques", "patterns", "dataprep", "styling"];

/// A validated tag map. Unknown dimensions are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Tags(BTreeMap<String, Vec<String>>);

impl Tags {
  pub fn new() -> Self { Self::default() }

  /// Build from `(dimension, values)` pairs, validating the result.
  pub fn from_pairs<D, I, V>(pairs: impl IntoIterator<Item = (D, I)>) -> Result<Self>
  where
    D: Into<String>,
    I: IntoIterator<Item = V>,
    V: Into<String>,
  {
    let raw = pairs
      .into_iter()
      .map(|(d, vs)| (d.into(), vs.into_iter().map(Into::into).collect()))
      .collect();
    Self::from_map(raw, "tags")
  }

  /// Validate an arbitrary JSON value as a tag map. `field` names the column
  /// in error records (`tags` or `impl_tags`).
  pub fn from_json(value: &Value, field: &str) -> Result<Self> {
    let Value::Object(obj) = value else {
      return Err(Error::tag_shape(field, "expected a JSON object"));
    };

    let mut raw = BTreeMap::new();
    for (dimension, values) in obj {
      let path = format!("{field}.{dimension}");
      let Value::Array(items) = values else {
        return Err(Error::tag_shape(path, "expected an array of strings"));
      };
      let strings = items
        .iter()
        .map(|v| match v {
          Value::String(s) => Ok(s.clone()),
          _ => Err(Error::tag_shape(&path, "array elements must be strings")),
        })
        .collect::<Result<Vec<_>>>()?;
      raw.insert(dimension.clone(), strings);
    }
    Self::from_map(raw, field)
  }

  fn from_map(raw: BTreeMap<String, Vec<String>>, field: &str) -> Result<Self> {
    let mut out = BTreeMap::new();
    for (dimension, mut values) in raw {
      if dimension.is_empty() {
        return Err(Error::tag_shape(field, "dimension names must be non-empty"));
      }
      values.sort();
      values.dedup();
      if values.len() > MAX_TAG_VALUES {
        return Err(Error::tag_shape(
          format!("{field}.{dimension}"),
          format!("{} values exceeds the limit of {MAX_TAG_VALUES}", values.len()),
        ));
      }
      out.insert(dimension, values);
    }
    Ok(Self(out))
  }

  pub fn get(&self, dimension: &str) -> Option<&[String]> {
    self.0.get(dimension).map(Vec::as_slice)
  }

  /// Containment test: does `dimension` hold `value`?
  pub fn contains(&self, dimension: &str, value: &str) -> bool {
    self
      .get(dimension)
      .is_some_and(|vs| vs.binary_search_by(|v| v.as_str().cmp(value)).is_ok())
  }

  pub fn dimensions(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn to_json(&self) -> Value {
    serde_json::to_value(&self.0).unwrap_or_else(|_| Value::Object(Default::default()))
  }
}

impl TryFrom<Value> for Tags {
  type Error = Error;

  fn try_from(value: Value) -> Result<Self> { Self::from_json(&value, "tags") }
}

pub fn is_spec_dimension(dimension: &str) -> bool {
  SPEC_TAG_DIMENSIONS.contains(&dimension)
}

pub fn is_impl_dimension(dimension: &str) -> bool {
  IMPL_TAG_DIMENSIONS.contains(&dimension)
}
