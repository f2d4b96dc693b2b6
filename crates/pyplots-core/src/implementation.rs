//! Impl: one concrete script rendering a spec in a specific library.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  history::History,
  spec::{nullable_string, string_field},
  tags::Tags,
};

// ─── Verdict ─────────────────────────────────────────────────────────────────

/// The review outcome. Absence of a verdict is modelled as `Option::None`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
  Approved,
  Rejected,
}

impl Verdict {
  /// Parse a stored or submitted literal; anything outside the vocabulary is
  /// an invariant violation.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| {
      Error::invariant(
        "review_verdict",
        format!("{s:?} is not one of APPROVED, REJECTED"),
      )
    })
  }
}

// ─── Quality score ───────────────────────────────────────────────────────────

/// An integer quality score in `[0, 100]`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct QualityScore(u8);

impl QualityScore {
  pub const MAX: u8 = 100;

  pub fn new(score: i64) -> Result<Self> {
    match u8::try_from(score) {
      Ok(s) if s <= Self::MAX => Ok(Self(s)),
      _ => Err(Error::invariant(
        "quality_score",
        format!("{score} is outside [0, {}]", Self::MAX),
      )),
    }
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for QualityScore {
  type Error = Error;

  fn try_from(score: i64) -> Result<Self> { Self::new(score) }
}

impl From<QualityScore> for i64 {
  fn from(score: QualityScore) -> Self { i64::from(score.0) }
}

// ─── Impl ────────────────────────────────────────────────────────────────────

/// Criterion name → score/notes record. Any JSON object is accepted.
pub type CriteriaChecklist = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impl {
  pub id:                        Uuid,
  pub spec_id:                   Uuid,
  pub library_id:                Uuid,
  /// Full source of the plot script.
  pub code:                      String,
  pub quality_score:             Option<QualityScore>,
  /// AI-produced description of the rendered image.
  pub review_image_description:  Option<String>,
  pub review_criteria_checklist: Option<CriteriaChecklist>,
  pub review_verdict:            Option<Verdict>,
  pub impl_tags:                 Tags,
  pub history:                   History,
  pub created_at:                DateTime<Utc>,
  pub updated_at:                DateTime<Utc>,
}

impl Impl {
  pub fn review(&self) -> ImplReview {
    ImplReview {
      verdict:            self.review_verdict,
      image_description:  self.review_image_description.clone(),
      criteria_checklist: self.review_criteria_checklist.clone(),
    }
  }
}

/// The review triple exactly as stored; absent fields serialise as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplReview {
  pub verdict:            Option<Verdict>,
  pub image_description:  Option<String>,
  pub criteria_checklist: Option<CriteriaChecklist>,
}

// ─── NewImpl ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::CatalogStore::create_impl`].
#[derive(Debug, Clone)]
pub struct NewImpl {
  pub spec_id:                   Uuid,
  pub library_id:                Uuid,
  pub code:                      String,
  pub quality_score:             Option<QualityScore>,
  pub review_image_description:  Option<String>,
  pub review_criteria_checklist: Option<CriteriaChecklist>,
  pub review_verdict:            Option<Verdict>,
  pub impl_tags:                 Tags,
}

impl NewImpl {
  /// Convenience constructor with every optional field unset.
  pub fn new(spec_id: Uuid, library_id: Uuid, code: impl Into<String>) -> Self {
    Self {
      spec_id,
      library_id,
      code: code.into(),
      quality_score: None,
      review_image_description: None,
      review_criteria_checklist: None,
      review_verdict: None,
      impl_tags: Tags::new(),
    }
  }

  pub fn with_score(mut self, score: QualityScore) -> Self {
    self.quality_score = Some(score);
    self
  }

  /// Parse a JSON creation body, classifying shape problems.
  pub fn from_json(value: &Value) -> Result<Self> {
    let Value::Object(obj) = value else {
      return Err(Error::invariant("body", "expected a JSON object"));
    };
    let spec_id = uuid_field("spec_id", obj.get("spec_id").unwrap_or(&Value::Null))?;
    let library_id = uuid_field("library_id", obj.get("library_id").unwrap_or(&Value::Null))?;
    let code = string_field("code", obj.get("code").unwrap_or(&Value::Null))?;

    // Everything else has the same shape as a patch.
    let mut rest = obj.clone();
    for key in ["spec_id", "library_id", "code"] {
      rest.remove(key);
    }
    let optional = ImplPatch::from_json(&Value::Object(rest))?;

    Ok(Self {
      spec_id,
      library_id,
      code,
      quality_score: optional.quality_score.flatten(),
      review_image_description: optional.review_image_description.flatten(),
      review_criteria_checklist: optional.review_criteria_checklist.flatten(),
      review_verdict: optional.review_verdict.flatten(),
      impl_tags: optional.impl_tags.unwrap_or_default(),
    })
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A partial update for [`crate::store::CatalogStore::update_impl`].
///
/// Nullable columns use `Option<Option<_>>`: outer `None` leaves the field
/// alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImplPatch {
  pub spec_id:                   Option<Uuid>,
  pub library_id:                Option<Uuid>,
  pub code:                      Option<String>,
  pub quality_score:             Option<Option<QualityScore>>,
  pub review_image_description:  Option<Option<String>>,
  pub review_criteria_checklist: Option<Option<CriteriaChecklist>>,
  pub review_verdict:            Option<Option<Verdict>>,
  pub impl_tags:                 Option<Tags>,
  /// Free-text message stored on the resulting event.
  pub reason:                    Option<String>,
}

impl ImplPatch {
  /// Parse a JSON patch object such as
  /// `{"quality_score": 95, "reason": "rerun"}`.
  pub fn from_json(value: &Value) -> Result<Self> {
    let Value::Object(obj) = value else {
      return Err(Error::invariant("patch", "expected a JSON object"));
    };

    let mut patch = Self::default();
    for (key, v) in obj {
      match key.as_str() {
        "spec_id" => patch.spec_id = Some(uuid_field(key, v)?),
        "library_id" => patch.library_id = Some(uuid_field(key, v)?),
        "code" => patch.code = Some(string_field(key, v)?),
        "quality_score" => {
          patch.quality_score = Some(match v {
            Value::Null => None,
            other => {
              let n = other
                .as_i64()
                .ok_or_else(|| Error::invariant(key, "expected an integer or null"))?;
              Some(QualityScore::new(n)?)
            }
          });
        }
        "review_image_description" => {
          patch.review_image_description = Some(nullable_string(key, v)?);
        }
        "review_criteria_checklist" => {
          patch.review_criteria_checklist = Some(match v {
            Value::Null => None,
            Value::Object(map) => Some(map.clone()),
            _ => return Err(Error::invariant(key, "expected a JSON object or null")),
          });
        }
        "review_verdict" => {
          patch.review_verdict = Some(match v {
            Value::Null => None,
            Value::String(s) => Some(Verdict::parse(s)?),
            _ => return Err(Error::invariant(key, "expected a verdict string or null")),
          });
        }
        "impl_tags" => patch.impl_tags = Some(Tags::from_json(v, "impl_tags")?),
        "reason" => patch.reason = nullable_string(key, v)?,
        other => {
          return Err(Error::invariant(other, "not an updatable impl field"));
        }
      }
    }
    Ok(patch)
  }

  pub fn reparents(&self) -> bool { self.spec_id.is_some() || self.library_id.is_some() }
}

fn uuid_field(key: &str, v: &Value) -> Result<Uuid> {
  v.as_str()
    .and_then(|s| Uuid::parse_str(s).ok())
    .ok_or_else(|| Error::invariant(key, "expected a UUID string"))
}
