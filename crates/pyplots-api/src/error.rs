//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use pyplots_core::{Classify, ErrorKind, ErrorRecord};
use thiserror::Error;

/// An error returned by an API handler, rendered as its [`ErrorRecord`].
#[derive(Debug, Error)]
#[error("{}: {}", .0.kind, .0.detail)]
pub struct ApiError(pub ErrorRecord);

impl ApiError {
  /// Wrap any classified store error.
  pub fn from_store<E: Classify>(err: E) -> Self { Self(err.record()) }
}

impl From<pyplots_core::Error> for ApiError {
  fn from(err: pyplots_core::Error) -> Self { Self::from_store(err) }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Conflict | ErrorKind::InUse => StatusCode::CONFLICT,
    ErrorKind::TagShapeError | ErrorKind::InvariantViolation => {
      StatusCode::UNPROCESSABLE_ENTITY
    }
    ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
    ErrorKind::BrokenChain
    | ErrorKind::UnknownRevision
    | ErrorKind::ApplyFailed
    | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = status_for(self.0.kind);
    if status.is_server_error() {
      tracing::warn!(kind = %self.0.kind, detail = %self.0.detail, "request failed");
    }
    (status, Json(self.0)).into_response()
  }
}
