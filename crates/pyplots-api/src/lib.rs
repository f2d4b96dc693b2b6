//! JSON REST API for the pyplots catalog.
//!
//! Exposes an axum [`Router`] backed by any
//! [`pyplots_core::store::CatalogQuery`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pyplots_api::api_router(store.clone()))
//! ```
//!
//! The acting user for every mutation is taken from the `x-pyplots-actor`
//! header and defaults to `anonymous`.

pub mod error;
pub mod extract;
pub mod impls;
pub mod libraries;
pub mod search;
pub mod specs;

use std::{convert::Infallible, sync::Arc};

use axum::{
  Router,
  extract::FromRequestParts,
  http::request::Parts,
  routing::{get, post, put},
};
use pyplots_core::{context::CallContext, store::CatalogQuery};

pub use error::ApiError;

/// Header naming the human or agent behind a request.
pub const ACTOR_HEADER: &str = "x-pyplots-actor";

/// The caller recorded on revision events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
  pub fn context(self) -> CallContext { CallContext::new(self.0) }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let actor = parts
      .headers
      .get(ACTOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .unwrap_or("anonymous");
    Ok(Self(actor.to_owned()))
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: CatalogQuery + 'static,
{
  Router::new()
    // Libraries
    .route("/libraries", get(libraries::list::<S>).post(libraries::create::<S>))
    .route("/libraries/{id}", get(libraries::get_one::<S>))
    .route("/libraries/{id}/version", put(libraries::set_version::<S>))
    // Specs
    .route("/specs", get(specs::list::<S>).post(specs::create::<S>))
    .route("/specs/by-tag", get(search::specs_by_tag::<S>))
    .route(
      "/specs/{id}",
      get(specs::get_one::<S>)
        .patch(specs::update::<S>)
        .delete(specs::delete::<S>),
    )
    // Impls
    .route("/impls", post(impls::create::<S>))
    .route("/impls/by-tag", get(search::impls_by_tag::<S>))
    .route("/impls/top", get(search::top::<S>))
    .route(
      "/impls/{id}",
      get(impls::get_one::<S>)
        .patch(impls::update::<S>)
        .delete(impls::delete::<S>),
    )
    .route("/impls/{id}/review", get(impls::review::<S>))
    // Lookup
    .route("/lookup", get(search::lookup::<S>))
    .with_state(store)
}
