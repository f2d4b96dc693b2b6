//! Library: a plotting toolkit the gallery targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A plotting library (matplotlib, seaborn, plotly, …).
///
/// Created once per supported library; only `version` changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
  pub id:         Uuid,
  /// Unique display name, e.g. `"matplotlib"`.
  pub name:       String,
  /// Pinned version string, e.g. `"3.10"`.
  pub version:    String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Reject blank names and versions before they reach a backend.
pub fn validate_library(name: &str, version: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::invariant("name", "library name must be non-empty"));
  }
  validate_version(version)
}

pub fn validate_version(version: &str) -> Result<()> {
  if version.trim().is_empty() {
    return Err(Error::invariant("version", "library version must be non-empty"));
  }
  Ok(())
}
