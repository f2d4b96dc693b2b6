//! Request extractors whose rejections render as an [`ApiError`], so a
//! malformed body, path or query string gets the same `{kind, detail,
//! field?}` record as any store failure.

use axum::extract::{
  FromRequest, FromRequestParts,
  rejection::{JsonRejection, PathRejection, QueryRejection},
};
use pyplots_core::{ErrorKind, ErrorRecord};

use crate::error::ApiError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Body<T>(pub T);

/// Typed path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParams<T>(pub T);

/// Typed query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

fn malformed(field: &str, detail: String) -> ApiError {
  ApiError(ErrorRecord {
    kind: ErrorKind::InvariantViolation,
    detail,
    field: Some(field.to_owned()),
  })
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { malformed("body", rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { malformed("path", rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { malformed("query", rejection.body_text()) }
}
