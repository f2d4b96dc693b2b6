//! Read-only query endpoints: tag containment, quality ranking and the
//! `(spec slug, library name)` lookup.

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
};
use pyplots_core::{
  Error,
  error::Entity,
  implementation::Impl,
  spec::Spec,
  store::{CatalogQuery, ImplFilter, TagFilter},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, extract::QueryParams};

/// Default page size for `/impls/top`.
pub const DEFAULT_TOP_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct TagParams {
  pub dimension: String,
  pub value:     String,
}

/// `GET /specs/by-tag?dimension=plot_type&value=bar`
pub async fn specs_by_tag<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  QueryParams(params): QueryParams<TagParams>,
) -> Result<Json<Vec<Spec>>, ApiError> {
  let specs = store
    .find_specs_by_tag(params.dimension, params.value)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(specs))
}

/// `GET /impls/by-tag?dimension=techniques&value=annotations`
pub async fn impls_by_tag<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  QueryParams(params): QueryParams<TagParams>,
) -> Result<Json<Vec<Impl>>, ApiError> {
  let impls = store
    .find_impls_by_impl_tag(params.dimension, params.value)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(impls))
}

#[derive(Debug, Default, Deserialize)]
pub struct TopParams {
  pub limit:      Option<usize>,
  pub library_id: Option<Uuid>,
  pub spec_id:    Option<Uuid>,
  pub dimension:  Option<String>,
  pub value:      Option<String>,
}

impl TopParams {
  fn filter(self) -> Result<(usize, ImplFilter), Error> {
    let tag = match (self.dimension, self.value) {
      (Some(dimension), Some(value)) => Some(TagFilter { dimension, value }),
      (None, None) => None,
      (Some(_), None) => return Err(Error::invariant("value", "required with dimension")),
      (None, Some(_)) => return Err(Error::invariant("dimension", "required with value")),
    };
    let filter = ImplFilter {
      library_id: self.library_id,
      spec_id: self.spec_id,
      tag,
    };
    Ok((self.limit.unwrap_or(DEFAULT_TOP_LIMIT), filter))
  }
}

/// `GET /impls/top[?limit=&library_id=&spec_id=&dimension=&value=]`
pub async fn top<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  QueryParams(params): QueryParams<TopParams>,
) -> Result<Json<Vec<Impl>>, ApiError> {
  let (limit, filter) = params.filter()?;
  let impls = store
    .top_impls_by_quality(limit, filter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(impls))
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
  pub spec:    String,
  pub library: String,
}

/// `GET /lookup?spec=bar-basic&library=matplotlib`: 404 when the pair has
/// no impl.
pub async fn lookup<S: CatalogQuery>(
  State(store): State<Arc<S>>,
  QueryParams(params): QueryParams<LookupParams>,
) -> Result<Json<Impl>, ApiError> {
  let key = format!("{}/{}", params.spec, params.library);
  let imp = store
    .lookup(params.spec, params.library)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| Error::not_found(Entity::Impl, key))?;
  Ok(Json(imp))
}
