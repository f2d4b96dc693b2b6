//! [`MemoryStore`]: the catalog held in process memory.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use pyplots_core::{
  context::CallContext,
  error::Entity,
  history::{HistoryPolicy, Recorder},
  implementation::{Impl, ImplPatch, ImplReview, NewImpl},
  library::{validate_library, validate_version, Library},
  spec::{NewSpec, Spec, SpecPatch},
  store::{rank_by_quality, CatalogQuery, CatalogStore, ImplFilter},
  Error, Result,
};

#[derive(Debug, Default)]
struct State {
  libraries: BTreeMap<Uuid, Library>,
  specs:     BTreeMap<Uuid, Spec>,
  impls:     BTreeMap<Uuid, Impl>,
}

impl State {
  fn ensure_spec(&self, id: Uuid) -> Result<()> {
    if !self.specs.contains_key(&id) {
      return Err(Error::not_found(Entity::Spec, id));
    }
    Ok(())
  }

  fn ensure_library(&self, id: Uuid) -> Result<()> {
    if !self.libraries.contains_key(&id) {
      return Err(Error::not_found(Entity::Library, id));
    }
    Ok(())
  }

  fn ensure_pair_free(&self, spec_id: Uuid, library_id: Uuid, except: Option<Uuid>) -> Result<()> {
    let taken = self.impls.values().find(|i| {
      i.spec_id == spec_id && i.library_id == library_id && Some(i.id) != except
    });
    if let Some(existing) = taken {
      return Err(Error::Conflict(format!(
        "spec {spec_id} already has an impl for library {library_id} ({})",
        existing.id
      )));
    }
    Ok(())
  }
}

/// A catalog kept in ordered maps behind one mutex.
///
/// Every operation holds the lock for its whole read-check-write sequence,
/// which gives the same serialization the SQLite backend gets from its
/// transactions. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
  state:    Arc<Mutex<State>>,
  recorder: Recorder,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub fn with_policy(policy: HistoryPolicy) -> Self {
    Self { recorder: Recorder::new(policy), ..Self::default() }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CatalogStore for MemoryStore {
  type Error = Error;

  // ── Libraries ─────────────────────────────────────────────────────────────

  async fn create_library(
    &self,
    ctx: CallContext,
    name: String,
    version: String,
  ) -> Result<Library> {
    validate_library(&name, &version)?;
    let mut state = self.lock();
    if state.libraries.values().any(|l| l.name == name) {
      return Err(Error::Conflict(format!("library {name} already exists")));
    }

    let now = Utc::now();
    let library = Library { id: Uuid::new_v4(), name, version, created_at: now, updated_at: now };
    ctx.check()?;
    state.libraries.insert(library.id, library.clone());
    debug!(library_id = %library.id, name = %library.name, actor = %ctx.actor, "library created");
    Ok(library)
  }

  async fn upsert_library_version(
    &self,
    ctx: CallContext,
    id: Uuid,
    version: String,
  ) -> Result<Library> {
    ctx.check()?;
    validate_version(&version)?;
    let mut state = self.lock();
    let library = state
      .libraries
      .get_mut(&id)
      .ok_or_else(|| Error::not_found(Entity::Library, id))?;
    if library.version == version {
      return Ok(library.clone());
    }

    ctx.check()?;
    library.version = version;
    library.updated_at = Utc::now();
    debug!(library_id = %id, version = %library.version, actor = %ctx.actor, "library version set");
    Ok(library.clone())
  }

  async fn get_library(&self, id: Uuid) -> Result<Option<Library>> {
    Ok(self.lock().libraries.get(&id).cloned())
  }

  async fn list_libraries(&self) -> Result<Vec<Library>> {
    let mut libraries: Vec<Library> = self.lock().libraries.values().cloned().collect();
    libraries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(libraries)
  }

  // ── Specs ─────────────────────────────────────────────────────────────────

  async fn create_spec(&self, ctx: CallContext, input: NewSpec) -> Result<Spec> {
    input.validate()?;
    let mut state = self.lock();
    if state.specs.values().any(|s| s.slug == input.slug) {
      return Err(Error::Conflict(format!("spec {} already exists", input.slug)));
    }

    let now = Utc::now();
    let spec = Spec {
      id:         Uuid::new_v4(),
      slug:       input.slug,
      issue:      input.issue,
      content:    input.content,
      tags:       input.tags,
      updates:    Default::default(),
      created_at: now,
      updated_at: now,
    };
    ctx.check()?;
    state.specs.insert(spec.id, spec.clone());
    debug!(spec_id = %spec.id, slug = %spec.slug, actor = %ctx.actor, "spec created");
    Ok(spec)
  }

  async fn update_spec(&self, ctx: CallContext, id: Uuid, patch: SpecPatch) -> Result<Spec> {
    let mut state = self.lock();
    let current = state
      .specs
      .get(&id)
      .ok_or_else(|| Error::not_found(Entity::Spec, id))?;
    let Some(next) = self.recorder.record_spec(current, &patch, &ctx.actor, Utc::now())? else {
      return Ok(current.clone());
    };
    next.updates.ensure_appends_one(&current.updates, "updates")?;

    ctx.check()?;
    state.specs.insert(id, next.clone());
    debug!(spec_id = %id, updates = next.updates.len(), actor = %ctx.actor, "spec updated");
    Ok(next)
  }

  async fn delete_spec(&self, ctx: CallContext, id: Uuid) -> Result<()> {
    let mut state = self.lock();
    state.ensure_spec(id)?;
    let impls = state.impls.values().filter(|i| i.spec_id == id).count();
    if impls > 0 {
      return Err(Error::InUse { spec_id: id, impls });
    }

    ctx.check()?;
    state.specs.remove(&id);
    debug!(spec_id = %id, actor = %ctx.actor, "spec deleted");
    Ok(())
  }

  async fn get_spec(&self, id: Uuid) -> Result<Option<Spec>> {
    Ok(self.lock().specs.get(&id).cloned())
  }

  async fn get_spec_by_slug(&self, slug: String) -> Result<Option<Spec>> {
    Ok(self.lock().specs.values().find(|s| s.slug == slug).cloned())
  }

  async fn list_specs(&self) -> Result<Vec<Spec>> {
    let mut specs: Vec<Spec> = self.lock().specs.values().cloned().collect();
    specs.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(specs)
  }

  // ── Impls ─────────────────────────────────────────────────────────────────

  async fn create_impl(&self, ctx: CallContext, input: NewImpl) -> Result<Impl> {
    let mut state = self.lock();
    state.ensure_spec(input.spec_id)?;
    state.ensure_library(input.library_id)?;
    state.ensure_pair_free(input.spec_id, input.library_id, None)?;

    let now = Utc::now();
    let imp = Impl {
      id: Uuid::new_v4(),
      spec_id: input.spec_id,
      library_id: input.library_id,
      code: input.code,
      quality_score: input.quality_score,
      review_image_description: input.review_image_description,
      review_criteria_checklist: input.review_criteria_checklist,
      review_verdict: input.review_verdict,
      impl_tags: input.impl_tags,
      history: Default::default(),
      created_at: now,
      updated_at: now,
    };
    ctx.check()?;
    state.impls.insert(imp.id, imp.clone());
    debug!(
      impl_id = %imp.id,
      spec_id = %imp.spec_id,
      library_id = %imp.library_id,
      actor = %ctx.actor,
      "impl created"
    );
    Ok(imp)
  }

  async fn update_impl(&self, ctx: CallContext, id: Uuid, patch: ImplPatch) -> Result<Impl> {
    let mut state = self.lock();
    let current = state
      .impls
      .get(&id)
      .ok_or_else(|| Error::not_found(Entity::Impl, id))?;
    let Some(next) = self.recorder.record_impl(current, &patch, &ctx.actor, Utc::now())? else {
      return Ok(current.clone());
    };
    next.history.ensure_appends_one(&current.history, "history")?;

    if patch.reparents() {
      state.ensure_spec(next.spec_id)?;
      state.ensure_library(next.library_id)?;
      state.ensure_pair_free(next.spec_id, next.library_id, Some(id))?;
    }

    ctx.check()?;
    state.impls.insert(id, next.clone());
    debug!(impl_id = %id, history = next.history.len(), actor = %ctx.actor, "impl updated");
    Ok(next)
  }

  async fn delete_impl(&self, ctx: CallContext, id: Uuid) -> Result<()> {
    let mut state = self.lock();
    if !state.impls.contains_key(&id) {
      return Err(Error::not_found(Entity::Impl, id));
    }
    ctx.check()?;
    state.impls.remove(&id);
    debug!(impl_id = %id, actor = %ctx.actor, "impl deleted");
    Ok(())
  }

  async fn get_impl(&self, id: Uuid) -> Result<Option<Impl>> {
    Ok(self.lock().impls.get(&id).cloned())
  }

  async fn list_impls_for_spec(&self, spec_id: Uuid) -> Result<Vec<Impl>> {
    Ok(
      self
        .lock()
        .impls
        .values()
        .filter(|i| i.spec_id == spec_id)
        .cloned()
        .collect(),
    )
  }
}

impl CatalogQuery for MemoryStore {
  async fn find_specs_by_tag(&self, dimension: String, value: String) -> Result<Vec<Spec>> {
    let mut specs: Vec<Spec> = self
      .lock()
      .specs
      .values()
      .filter(|s| s.tags.contains(&dimension, &value))
      .cloned()
      .collect();
    specs.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(specs)
  }

  async fn find_impls_by_impl_tag(&self, dimension: String, value: String) -> Result<Vec<Impl>> {
    Ok(
      self
        .lock()
        .impls
        .values()
        .filter(|i| i.impl_tags.contains(&dimension, &value))
        .cloned()
        .collect(),
    )
  }

  async fn top_impls_by_quality(&self, limit: usize, filter: ImplFilter) -> Result<Vec<Impl>> {
    let mut impls: Vec<Impl> = self
      .lock()
      .impls
      .values()
      .filter(|i| filter.matches(i))
      .cloned()
      .collect();
    rank_by_quality(&mut impls);
    impls.truncate(limit);
    Ok(impls)
  }

  async fn get_impl_review(&self, id: Uuid) -> Result<ImplReview> {
    self
      .lock()
      .impls
      .get(&id)
      .map(Impl::review)
      .ok_or_else(|| Error::not_found(Entity::Impl, id))
  }

  async fn lookup(&self, spec_slug: String, library_name: String) -> Result<Option<Impl>> {
    let state = self.lock();
    let spec = state.specs.values().find(|s| s.slug == spec_slug);
    let library = state.libraries.values().find(|l| l.name == library_name);
    let (Some(spec), Some(library)) = (spec, library) else {
      return Ok(None);
    };
    Ok(
      state
        .impls
        .values()
        .find(|i| i.spec_id == spec.id && i.library_id == library.id)
        .cloned(),
    )
  }
}
