//! Spec: the library-independent description of a chart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result, history::History, tags::Tags};

/// A plot specification, e.g. `bar-grouped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
  pub id:         Uuid,
  /// Lowercase, hyphen-separated, unique.
  pub slug:       String,
  /// Upstream tracking ticket.
  pub issue:      Option<i64>,
  /// Markdown body.
  pub content:    String,
  pub tags:       Tags,
  /// One event per mutation of `content`, `tags` or `issue`.
  pub updates:    History,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::store::CatalogStore::create_spec`].
#[derive(Debug, Clone, Default)]
pub struct NewSpec {
  pub slug:    String,
  pub content: String,
  pub tags:    Tags,
  pub issue:   Option<i64>,
}

impl NewSpec {
  pub fn new(slug: impl Into<String>, content: impl Into<String>, tags: Tags) -> Self {
    Self {
      slug: slug.into(),
      content: content.into(),
      tags,
      issue: None,
    }
  }

  pub fn validate(&self) -> Result<()> { validate_slug(&self.slug) }
}

/// Checks the `[a-z0-9]+(-[a-z0-9]+)*` slug shape.
pub fn validate_slug(slug: &str) -> Result<()> {
  let well_formed = !slug.is_empty()
    && slug
      .split('-')
      .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
  if !well_formed {
    return Err(Error::invariant(
      "slug",
      format!("{slug:?} must be lowercase words separated by single hyphens"),
    ));
  }
  Ok(())
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A partial update for [`crate::store::CatalogStore::update_spec`].
///
/// `None` leaves a field untouched; `issue: Some(None)` clears the issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecPatch {
  pub content: Option<String>,
  pub tags:    Option<Tags>,
  pub issue:   Option<Option<i64>>,
  /// Free-text message stored on the resulting event.
  pub reason:  Option<String>,
}

impl SpecPatch {
  /// Parse a JSON patch object such as `{"content": "...", "reason": "..."}`.
  pub fn from_json(value: &Value) -> Result<Self> {
    let Value::Object(obj) = value else {
      return Err(Error::invariant("patch", "expected a JSON object"));
    };

    let mut patch = Self::default();
    for (key, v) in obj {
      match key.as_str() {
        "content" => patch.content = Some(string_field(key, v)?),
        "tags" => patch.tags = Some(Tags::from_json(v, "tags")?),
        "issue" => patch.issue = Some(nullable_i64(key, v)?),
        "reason" => patch.reason = nullable_string(key, v)?,
        other => {
          return Err(Error::invariant(other, "not an updatable spec field"));
        }
      }
    }
    Ok(patch)
  }
}

// ─── JSON field helpers ──────────────────────────────────────────────────────

pub(crate) fn string_field(key: &str, v: &Value) -> Result<String> {
  v.as_str()
    .map(str::to_owned)
    .ok_or_else(|| Error::invariant(key, "expected a string"))
}

pub(crate) fn nullable_string(key: &str, v: &Value) -> Result<Option<String>> {
  match v {
    Value::Null => Ok(None),
    other => string_field(key, other).map(Some),
  }
}

pub(crate) fn nullable_i64(key: &str, v: &Value) -> Result<Option<i64>> {
  match v {
    Value::Null => Ok(None),
    other => other
      .as_i64()
      .map(Some)
      .ok_or_else(|| Error::invariant(key, "expected an integer or null")),
  }
}
