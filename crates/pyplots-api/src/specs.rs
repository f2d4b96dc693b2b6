//! Handlers for `/specs` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/specs` | Ordered by slug |
//! | `POST`   | `/specs` | Body: `{"slug","content","tags"?,"issue"?}` |
//! | `GET`    | `/specs/{id}` | 404 if not found |
//! | `PATCH`  | `/specs/{id}` | Body: a spec patch, e.g. `{"content":"...","reason":"..."}` |
//! | `DELETE` | `/specs/{id}` | 409 while impls reference it |

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
  spec::{NewSpec, Spec, SpecPatch},
  store::CatalogQuery,
  tags::Tags,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{Actor, error::ApiError, extract::{Body, PathParams}};

/// `GET /specs`
pub async fn list<S: CatalogQuery>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Spec>>, ApiError> {
  let specs = store.list_specs().await.map_err(ApiError::from_store)?;
  Ok(Json(specs))
}

/// Creation body. `tags` stays raw JSON so shape problems are reported as
/// *TagShapeError* instead of a generic decode failure.
#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub slug:    String,
  pub content: String,
  #[serde(default)]
  pub tags:    Option<Value>,
  #[serde(default)]
  pub issue:   Option<i64>,
}

impl CreateBody {
  fn into_new_spec(self) -> Result<NewSpec, Error> {
    let tags = match self.tags {
      Some(value) => Tags::from_json(&value, "tags")?,
      None => Tags::new(),
    };
    Ok(NewSpec {
      issue: self.issue,
      ..NewSpec::new(self.slug, self.content, tags)
    })
  }
}

/// `POST /specs`: returns 201 and the stored spec.
pub async fn create<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  actor: Actor,
  Body(body): Body<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let spec = store
    .create_spec(actor.context(), body.into_new_spec()?)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(spec)))
}

/// `GET /specs/{id}`
pub async fn get_one<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
) -> Result<Json<Spec>, ApiError> {
  let spec = store
    .get_spec(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| Error::not_found(Entity::Spec, id))?;
  Ok(Json(spec))
}

/// `PATCH /specs/{id}`
pub async fn update<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
  actor: Actor,
  Body(body): Body<Value>,
) -> Result<Json<Spec>, ApiError> {
  let patch = SpecPatch::from_json(&body)?;
  let spec = store
    .update_spec(actor.context(), id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(spec))
}

/// `DELETE /specs/{id}`: 204 on success.
pub async fn delete<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  PathParams(id): PathParams<Uuid>,
  actor: Actor,
) -> Result<StatusCode, ApiError> {
  store
    .delete_spec(actor.context(), id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}
