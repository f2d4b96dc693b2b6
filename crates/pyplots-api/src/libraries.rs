//! Handlers for `/libraries` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/libraries` | Ordered by name |
//! | `POST` | `/libraries` | Body: `{"name":"matplotlib","version":"3.10"}` |
//! | `GET`  | `/libraries/{id}` | 404 if not found |
//! | `PUT`  | `/libraries/{id}/version` | Body: `{"version":"3.11"}` |

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
  library::Library,
  store::CatalogQuery,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{Actor, error::ApiError, extract::{Body, PathParams}};

/// `GET /libraries`
pub async fn list<S: CatalogQuery>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Library>>, ApiError> {
  let libraries = store.list_libraries().await.map_err(ApiError::from_store)?;
  Ok(Json(libraries))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:    String,
  pub version: String,
}

/// `POST /libraries`: returns 201 and the stored library.
pub async fn create<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  actor: Actor,
  Body(body): Body<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let library = store
    .create_library(actor.context(), body.name, body.version)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(library)))
}

/// `GET /libraries/{id}`
pub async fn get_one<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
) -> Result<Json<Library>, ApiError> {
  let library = store
    .get_library(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| Error::not_found(Entity::Library, id))?;
  Ok(Json(library))
}

#[derive(Debug, Deserialize)]
pub struct VersionBody {
  pub version: String,
}

/// `PUT /libraries/{id}/version`
pub async fn set_version<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
  actor: Actor,
  Body(body): Body<VersionBody>,
) -> Result<Json<Library>, ApiError> {
  let library = store
    .upsert_library_version(actor.context(), id, body.version)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(library))
}
