//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Tag maps, review
//! checklists and history arrays are stored as compact JSON. UUIDs are stored
//! as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use pyplots_core::{
  history::History,
  implementation::{CriteriaChecklist, Impl, QualityScore, Verdict},
  library::Library,
  spec::Spec,
  tags::Tags,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ─────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &Tags) -> String { tags.to_json().to_string() }

pub fn decode_tags(s: &str, column: &'static str) -> Result<Tags> {
  let value: serde_json::Value = serde_json::from_str(s)?;
  Tags::from_json(&value, column).map_err(|e| Error::Corrupt {
    column,
    detail: e.to_string(),
  })
}

pub fn encode_history(history: &History) -> Result<String> {
  Ok(serde_json::to_string(history)?)
}

pub fn decode_history(s: &str) -> Result<History> { Ok(serde_json::from_str(s)?) }

pub fn encode_checklist(checklist: Option<&CriteriaChecklist>) -> Result<Option<String>> {
  checklist.map(serde_json::to_string).transpose().map_err(Error::from)
}

// ─── Scalars ──────────────────────────────────────────────────────────────────

pub fn decode_score(score: Option<i64>) -> Result<Option<QualityScore>> {
  score
    .map(|s| {
      QualityScore::new(s).map_err(|e| Error::Corrupt {
        column: "quality_score",
        detail: e.to_string(),
      })
    })
    .transpose()
}

pub fn decode_verdict(verdict: Option<&str>) -> Result<Option<Verdict>> {
  verdict
    .map(|v| {
      Verdict::parse(v).map_err(|e| Error::Corrupt {
        column: "review_verdict",
        detail: e.to_string(),
      })
    })
    .transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const LIBRARY_COLUMNS: &str = "id, name, version, created_at, updated_at";

/// Raw values read directly from a `libraries` row.
pub struct RawLibrary {
  pub id:         String,
  pub name:       String,
  pub version:    String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawLibrary {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      version:    row.get(2)?,
      created_at: row.get(3)?,
      updated_at: row.get(4)?,
    })
  }

  pub fn into_library(self) -> Result<Library> {
    Ok(Library {
      id:         decode_uuid(&self.id)?,
      name:       self.name,
      version:    self.version,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const SPEC_COLUMNS: &str =
  "id, slug, issue, content, tags, updates, created_at, updated_at";

/// Raw values read directly from a `specs` row.
pub struct RawSpec {
  pub id:         String,
  pub slug:       String,
  pub issue:      Option<i64>,
  pub content:    String,
  pub tags:       String,
  pub updates:    String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawSpec {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      slug:       row.get(1)?,
      issue:      row.get(2)?,
      content:    row.get(3)?,
      tags:       row.get(4)?,
      updates:    row.get(5)?,
      created_at: row.get(6)?,
      updated_at: row.get(7)?,
    })
  }

  pub fn into_spec(self) -> Result<Spec> {
    Ok(Spec {
      id:         decode_uuid(&self.id)?,
      slug:       self.slug,
      issue:      self.issue,
      content:    self.content,
      tags:       decode_tags(&self.tags, "tags")?,
      updates:    decode_history(&self.updates)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const IMPL_COLUMNS: &str = "id, spec_id, library_id, code, quality_score, \
   review_image_description, review_criteria_checklist, review_verdict, \
   impl_tags, history, created_at, updated_at";

/// Raw values read directly from an `impls` row.
pub struct RawImpl {
  pub id:                        String,
  pub spec_id:                   String,
  pub library_id:                String,
  pub code:                      String,
  pub quality_score:             Option<i64>,
  pub review_image_description:  Option<String>,
  pub review_criteria_checklist: Option<String>,
  pub review_verdict:            Option<String>,
  pub impl_tags:                 String,
  pub history:                   String,
  pub created_at:                String,
  pub updated_at:                String,
}

impl RawImpl {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                        row.get(0)?,
      spec_id:                   row.get(1)?,
      library_id:                row.get(2)?,
      code:                      row.get(3)?,
      quality_score:             row.get(4)?,
      review_image_description:  row.get(5)?,
      review_criteria_checklist: row.get(6)?,
      review_verdict:            row.get(7)?,
      impl_tags:                 row.get(8)?,
      history:                   row.get(9)?,
      created_at:                row.get(10)?,
      updated_at:                row.get(11)?,
    })
  }

  pub fn into_impl(self) -> Result<Impl> {
    let review_criteria_checklist = self
      .review_criteria_checklist
      .as_deref()
      .map(serde_json::from_str::<CriteriaChecklist>)
      .transpose()?;

    Ok(Impl {
      id: decode_uuid(&self.id)?,
      spec_id: decode_uuid(&self.spec_id)?,
      library_id: decode_uuid(&self.library_id)?,
      code: self.code,
      quality_score: decode_score(self.quality_score)?,
      review_image_description: self.review_image_description,
      review_criteria_checklist,
      review_verdict: decode_verdict(self.review_verdict.as_deref())?,
      impl_tags: decode_tags(&self.impl_tags, "impl_tags")?,
      history: decode_history(&self.history)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
