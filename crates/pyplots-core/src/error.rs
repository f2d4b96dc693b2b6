//! Error types for `pyplots-core`.
//!
//! Every public catalog operation fails with exactly one [`ErrorKind`]. The
//! kind, a human-readable detail and (where it applies) the offending field
//! are bundled into an [`ErrorRecord`] so that callers such as the HTTP
//! layer or the CLI can branch on the kind and show the detail verbatim.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;
use uuid::Uuid;

/// The catalog entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Entity {
  Library,
  Spec,
  Impl,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("{entity} not found: {key}")]
  NotFound { entity: Entity, key: String },

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("malformed {field}: {detail}")]
  TagShape { field: String, detail: String },

  #[error("spec {spec_id} is still referenced by {impls} impl(s)")]
  InUse { spec_id: Uuid, impls: usize },

  #[error("invariant violated on {field}: {detail}")]
  InvariantViolation { field: String, detail: String },

  #[error("broken migration chain: {0}")]
  BrokenChain(String),

  #[error("unknown revision: {0}")]
  UnknownRevision(String),

  #[error("revision {revision} failed to apply: {cause}")]
  ApplyFailed { revision: String, cause: String },

  #[error("operation cancelled")]
  Cancelled,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn not_found(entity: Entity, key: impl ToString) -> Self {
    Self::NotFound { entity, key: key.to_string() }
  }

  pub fn tag_shape(field: impl Into<String>, detail: impl Into<String>) -> Self {
    Self::TagShape { field: field.into(), detail: detail.into() }
  }

  pub fn invariant(field: impl Into<String>, detail: impl Into<String>) -> Self {
    Self::InvariantViolation { field: field.into(), detail: detail.into() }
  }
}

// ─── Structured records ──────────────────────────────────────────────────────

/// The failure taxonomy shared by every backend.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Conflict,
  TagShapeError,
  InUse,
  InvariantViolation,
  BrokenChain,
  UnknownRevision,
  ApplyFailed,
  Cancelled,
  /// The storage engine failed for a reason outside the catalog's control
  /// (I/O, a closed connection, a corrupt file).
  Storage,
}

/// `{kind, detail, field?}`: what callers see when an operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
  pub kind:   ErrorKind,
  pub detail: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field:  Option<String>,
}

/// Maps an error onto the catalog taxonomy.
///
/// Backend error types implement this so that callers never need to know
/// which engine produced a failure.
pub trait Classify {
  fn record(&self) -> ErrorRecord;

  fn kind(&self) -> ErrorKind { self.record().kind }
}

impl Classify for Error {
  fn record(&self) -> ErrorRecord {
    let (kind, field) = match self {
      Self::NotFound { .. } => (ErrorKind::NotFound, None),
      Self::Conflict(_) => (ErrorKind::Conflict, None),
      Self::TagShape { field, .. } => (ErrorKind::TagShapeError, Some(field.clone())),
      Self::InUse { .. } => (ErrorKind::InUse, None),
      Self::InvariantViolation { field, .. } => {
        (ErrorKind::InvariantViolation, Some(field.clone()))
      }
      Self::BrokenChain(_) => (ErrorKind::BrokenChain, None),
      Self::UnknownRevision(_) => (ErrorKind::UnknownRevision, None),
      Self::ApplyFailed { .. } => (ErrorKind::ApplyFailed, None),
      Self::Cancelled => (ErrorKind::Cancelled, None),
      // A JSON column that no longer decodes is a bug, not a caller error.
      Self::Serialization(_) => (ErrorKind::InvariantViolation, None),
    };
    ErrorRecord { kind, detail: self.to_string(), field }
  }
}
