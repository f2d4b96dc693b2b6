//! Error type for `pyplots-store-sqlite`.

use pyplots_core::{Classify, ErrorKind, ErrorRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Catalog(#[from] pyplots_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value no longer decodes into its domain type.
  #[error("corrupt {column}: {detail}")]
  Corrupt { column: &'static str, detail: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn record(&self) -> ErrorRecord {
    match self {
      Self::Catalog(e) => e.record(),
      Self::Corrupt { column, .. } => ErrorRecord {
        kind:   ErrorKind::InvariantViolation,
        detail: self.to_string(),
        field:  Some((*column).to_owned()),
      },
      _ => ErrorRecord {
        kind:   ErrorKind::Storage,
        detail: self.to_string(),
        field:  None,
      },
    }
  }
}
