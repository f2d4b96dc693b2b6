//! The `CatalogStore` / `CatalogQuery` traits and supporting query types.
//!
//! The traits are implemented by storage backends (`pyplots-store-sqlite`,
//! `pyplots-store-memory`). Higher layers (`pyplots-api`, `pyplots-cli`)
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  context::CallContext,
  error::Classify,
  implementation::{Impl, ImplPatch, ImplReview, NewImpl},
  library::Library,
  spec::{NewSpec, Spec, SpecPatch},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// A `(dimension, value)` containment predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
  pub dimension: String,
  pub value:     String,
}

/// Optional constraints for [`CatalogQuery::top_impls_by_quality`].
#[derive(Debug, Clone, Default)]
pub struct ImplFilter {
  pub library_id: Option<Uuid>,
  pub spec_id:    Option<Uuid>,
  /// Matched against `impl_tags`.
  pub tag:        Option<TagFilter>,
}

impl ImplFilter {
  pub fn matches(&self, imp: &Impl) -> bool {
    self.library_id.is_none_or(|id| imp.library_id == id)
      && self.spec_id.is_none_or(|id| imp.spec_id == id)
      && self
        .tag
        .as_ref()
        .is_none_or(|t| imp.impl_tags.contains(&t.dimension, &t.value))
  }
}

/// Sort impls by score descending, null scores last, ties by id ascending.
pub fn rank_by_quality(impls: &mut [Impl]) {
  impls.sort_by(|a, b| {
    b.quality_score
      .is_some()
      .cmp(&a.quality_score.is_some())
      .then_with(|| b.quality_score.cmp(&a.quality_score))
      .then_with(|| a.id.cmp(&b.id))
  });
}

// ─── Write surface ───────────────────────────────────────────────────────────

/// Abstraction over a catalog backend: the sole write path for libraries,
/// specs and impls.
///
/// Every `update_*` reads the current row, diffs it against the patch, and
/// writes the new row together with exactly one appended revision event in
/// a single transaction. A patch that changes nothing writes nothing.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Libraries ─────────────────────────────────────────────────────────

  /// Register a library. Fails with *Conflict* if `name` is taken.
  fn create_library(
    &self,
    ctx: CallContext,
    name: String,
    version: String,
  ) -> impl Future<Output = Result<Library, Self::Error>> + Send + '_;

  /// Bump the pinned version of an existing library.
  fn upsert_library_version(
    &self,
    ctx: CallContext,
    id: Uuid,
    version: String,
  ) -> impl Future<Output = Result<Library, Self::Error>> + Send + '_;

  fn get_library(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Library>, Self::Error>> + Send + '_;

  /// All libraries ordered by name.
  fn list_libraries(
    &self,
  ) -> impl Future<Output = Result<Vec<Library>, Self::Error>> + Send + '_;

  // ── Specs ─────────────────────────────────────────────────────────────

  /// Create a spec with an empty `updates` array. Fails with *Conflict* on a
  /// duplicate slug.
  fn create_spec(
    &self,
    ctx: CallContext,
    input: NewSpec,
  ) -> impl Future<Output = Result<Spec, Self::Error>> + Send + '_;

  /// Apply `patch`, appending one event carrying the prior value of every
  /// changed field.
  fn update_spec(
    &self,
    ctx: CallContext,
    id: Uuid,
    patch: SpecPatch,
  ) -> impl Future<Output = Result<Spec, Self::Error>> + Send + '_;

  /// Remove a spec. Fails with *InUse* while any impl references it.
  fn delete_spec(
    &self,
    ctx: CallContext,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_spec(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Spec>, Self::Error>> + Send + '_;

  fn get_spec_by_slug(
    &self,
    slug: String,
  ) -> impl Future<Output = Result<Option<Spec>, Self::Error>> + Send + '_;

  /// All specs ordered by slug.
  fn list_specs(&self) -> impl Future<Output = Result<Vec<Spec>, Self::Error>> + Send + '_;

  // ── Impls ─────────────────────────────────────────────────────────────

  /// Create an impl with an empty `history`. Fails with *NotFound* if the
  /// spec or library is missing and *Conflict* if the pair already has one.
  fn create_impl(
    &self,
    ctx: CallContext,
    input: NewImpl,
  ) -> impl Future<Output = Result<Impl, Self::Error>> + Send + '_;

  /// Apply `patch`, appending one event to `history`. Re-parenting onto a
  /// pair that already has an impl fails with *Conflict*.
  fn update_impl(
    &self,
    ctx: CallContext,
    id: Uuid,
    patch: ImplPatch,
  ) -> impl Future<Output = Result<Impl, Self::Error>> + Send + '_;

  fn delete_impl(
    &self,
    ctx: CallContext,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_impl(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Impl>, Self::Error>> + Send + '_;

  /// Every impl of a spec, ordered by id.
  fn list_impls_for_spec(
    &self,
    spec_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Impl>, Self::Error>> + Send + '_;
}

// ─── Read surface ────────────────────────────────────────────────────────────

/// Structured reads over the catalog. None of these touch history or
/// mutate state.
pub trait CatalogQuery: CatalogStore {
  /// Specs whose `tags[dimension]` contains `value`, ordered by slug.
  fn find_specs_by_tag(
    &self,
    dimension: String,
    value: String,
  ) -> impl Future<Output = Result<Vec<Spec>, Self::Error>> + Send + '_;

  /// Impls whose `impl_tags[dimension]` contains `value`, ordered by id.
  fn find_impls_by_impl_tag(
    &self,
    dimension: String,
    value: String,
  ) -> impl Future<Output = Result<Vec<Impl>, Self::Error>> + Send + '_;

  /// Impls ranked by [`rank_by_quality`], at most `limit` of them.
  fn top_impls_by_quality(
    &self,
    limit: usize,
    filter: ImplFilter,
  ) -> impl Future<Output = Result<Vec<Impl>, Self::Error>> + Send + '_;

  /// The stored review of an impl. Fails with *NotFound* for a missing id.
  fn get_impl_review(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<ImplReview, Self::Error>> + Send + '_;

  /// The unique impl for `(spec_slug, library_name)`, if any.
  fn lookup(
    &self,
    spec_slug: String,
    library_name: String,
  ) -> impl Future<Output = Result<Option<Impl>, Self::Error>> + Send + '_;
}
