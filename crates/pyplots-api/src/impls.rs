//! Handlers for `/impls` endpoints.
//!
//! Creation and patch bodies are parsed from raw JSON by the core
//! constructors, so a bad verdict or an out-of-range score comes back as a
//! structured *InvariantViolation* rather than a decode error.

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use pyplots_core::{
  Error,
  error::Entity,
  implementation::{Impl, ImplPatch, ImplReview, NewImpl},
  store::CatalogQuery,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{Actor, error::ApiError, extract::{Body, PathParams}};

/// `POST /impls`: body carries `spec_id`, `library_id`, `code` and any of
/// the optional review fields. Returns 201.
pub async fn create<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  actor: Actor,
  Body(body): Body<Value>,
) -> Result<impl IntoResponse, ApiError> {
  let input = NewImpl::from_json(&body)?;
  let imp = store
    .create_impl(actor.context(), input)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(imp)))
}

/// `GET /impls/{id}`
pub async fn get_one<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
) -> Result<Json<Impl>, ApiError> {
  let imp = store
    .get_impl(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| Error::not_found(Entity::Impl, id))?;
  Ok(Json(imp))
}

/// `PATCH /impls/{id}`
pub async fn update<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
  actor: Actor,
  Body(body): Body<Value>,
) -> Result<Json<Impl>, ApiError> {
  let patch = ImplPatch::from_json(&body)?;
  let imp = store
    .update_impl(actor.context(), id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(imp))
}

/// `DELETE /impls/{id}`
pub async fn delete<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
  actor: Actor,
) -> Result<StatusCode, ApiError> {
  store
    .delete_impl(actor.context(), id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /impls/{id}/review`
pub async fn review<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
) -> Result<Json<ImplReview>, ApiError> {
  let review = store.get_impl_review(id).await.map_err(ApiError::from_store)?;
  Ok(Json(review))
}
