//! [`SqliteStore`]: the SQLite implementation of [`CatalogStore`] and
//! [`CatalogQuery`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{ffi, Connection, OptionalExtension as _, Row, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use pyplots_core::{
  context::CallContext,
  error::Entity,
  history::{HistoryPolicy, Recorder},
  implementation::{Impl, ImplPatch, ImplReview, NewImpl},
  library::{validate_library, validate_version, Library},
  spec::{NewSpec, Spec, SpecPatch},
  store::{CatalogQuery, CatalogStore, ImplFilter},
  tags::{is_impl_dimension, is_spec_dimension},
  Error as CatalogError,
};

use crate::{
  encode::{
    encode_checklist, encode_dt, encode_history, encode_tags, encode_uuid, RawImpl,
    RawLibrary, RawSpec, IMPL_COLUMNS, LIBRARY_COLUMNS, SPEC_COLUMNS,
  },
  migrate::{upgrade_to_head, CONNECTION_PRAGMAS},
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A pyplots catalog backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  recorder: Recorder,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and upgrade its schema to head.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, HistoryPolicy::default()).await
  }

  /// Like [`open`](Self::open), recording history under `policy`.
  pub async fn open_with(path: impl AsRef<Path>, policy: HistoryPolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, policy).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, HistoryPolicy::default()).await
  }

  async fn init(conn: tokio_rusqlite::Connection, policy: HistoryPolicy) -> Result<Self> {
    let store = Self { conn, recorder: Recorder::new(policy) };
    let applied = store
      .with_conn(|conn| {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        upgrade_to_head(conn)
      })
      .await?;
    if !applied.is_empty() {
      debug!(revisions = ?applied, "catalog schema upgraded");
    }
    Ok(store)
  }

  /// Run `f` on the connection thread.
  pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn query_one<R, T>(
  conn: &Connection,
  sql: &str,
  params: impl rusqlite::Params,
  from_row: fn(&Row<'_>) -> rusqlite::Result<R>,
  decode: fn(R) -> Result<T>,
) -> Result<Option<T>> {
  conn
    .query_row(sql, params, from_row)
    .optional()?
    .map(decode)
    .transpose()
}

fn query_all<R, T>(
  conn: &Connection,
  sql: &str,
  params: impl rusqlite::Params,
  from_row: fn(&Row<'_>) -> rusqlite::Result<R>,
  decode: fn(R) -> Result<T>,
) -> Result<Vec<T>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params, from_row)?
    .collect::<rusqlite::Result<Vec<R>>>()?;
  raws.into_iter().map(decode).collect()
}

fn select_library(conn: &Connection, id: &str) -> Result<Option<Library>> {
  query_one(
    conn,
    &format!("SELECT {LIBRARY_COLUMNS} FROM libraries WHERE id = ?1"),
    [id],
    RawLibrary::from_row,
    RawLibrary::into_library,
  )
}

fn select_spec(conn: &Connection, id: &str) -> Result<Option<Spec>> {
  query_one(
    conn,
    &format!("SELECT {SPEC_COLUMNS} FROM specs WHERE id = ?1"),
    [id],
    RawSpec::from_row,
    RawSpec::into_spec,
  )
}

fn select_impl(conn: &Connection, id: &str) -> Result<Option<Impl>> {
  query_one(
    conn,
    &format!("SELECT {IMPL_COLUMNS} FROM impls WHERE id = ?1"),
    [id],
    RawImpl::from_row,
    RawImpl::into_impl,
  )
}

fn exists(conn: &Connection, sql: &str, key: &str) -> Result<bool> {
  Ok(conn.query_row(sql, [key], |_| Ok(())).optional()?.is_some())
}

/// Translate a constraint failure into the catalog taxonomy; anything else
/// stays a storage error.
fn write_error(err: rusqlite::Error, entity: Entity, key: &str) -> Error {
  if let rusqlite::Error::SqliteFailure(failure, message) = &err {
    let detail = message.clone().unwrap_or_else(|| failure.to_string());
    match failure.extended_code {
      ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
        return CatalogError::Conflict(format!("{entity} {key} already exists")).into();
      }
      ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return CatalogError::not_found(entity, key).into(),
      ffi::SQLITE_CONSTRAINT_CHECK
      | ffi::SQLITE_CONSTRAINT_NOTNULL
      | ffi::SQLITE_CONSTRAINT_TRIGGER => {
        return CatalogError::invariant(entity.to_string(), detail).into();
      }
      _ => {}
    }
  }
  err.into()
}

fn begin(conn: &mut Connection) -> Result<rusqlite::Transaction<'_>> {
  Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

fn ensure_spec_exists(conn: &Connection, id: Uuid) -> Result<()> {
  if !exists(conn, "SELECT 1 FROM specs WHERE id = ?1", &encode_uuid(id))? {
    return Err(CatalogError::not_found(Entity::Spec, id).into());
  }
  Ok(())
}

fn ensure_library_exists(conn: &Connection, id: Uuid) -> Result<()> {
  if !exists(conn, "SELECT 1 FROM libraries WHERE id = ?1", &encode_uuid(id))? {
    return Err(CatalogError::not_found(Entity::Library, id).into());
  }
  Ok(())
}

/// Fails with *Conflict* when `(spec_id, library_id)` already has an impl
/// other than `except`.
fn ensure_pair_free(
  conn: &Connection,
  spec_id: Uuid,
  library_id: Uuid,
  except: Option<Uuid>,
) -> Result<()> {
  let taken = conn
    .query_row(
      "SELECT id FROM impls WHERE spec_id = ?1 AND library_id = ?2 AND id IS NOT ?3",
      rusqlite::params![encode_uuid(spec_id), encode_uuid(library_id), except.map(encode_uuid)],
      |row| row.get::<_, String>(0),
    )
    .optional()?;
  if let Some(existing) = taken {
    return Err(
      CatalogError::Conflict(format!(
        "spec {spec_id} already has an impl for library {library_id} ({existing})"
      ))
      .into(),
    );
  }
  Ok(())
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = Error;

  // ── Libraries ─────────────────────────────────────────────────────────────

  async fn create_library(
    &self,
    ctx: CallContext,
    name: String,
    version: String,
  ) -> Result<Library> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    validate_library(&name, &version)?;
    let now = Utc::now();
    let library = Library {
      id: Uuid::new_v4(),
      name,
      version,
      created_at: now,
      updated_at: now,
    };

    let row = library.clone();
    self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        tx.execute(
          "INSERT INTO libraries (id, name, version, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            encode_uuid(row.id),
            row.name,
            row.version,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        )
        .map_err(|e| write_error(e, Entity::Library, &row.name))?;
        ctx.check()?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(library_id = %library.id, name = %library.name, %actor, "library created");
    Ok(library)
  }

  async fn upsert_library_version(
    &self,
    ctx: CallContext,
    id: Uuid,
    version: String,
  ) -> Result<Library> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    validate_version(&version)?;
    let id_str = encode_uuid(id);

    let library = self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        let current = select_library(&tx, &id_str)?
          .ok_or_else(|| CatalogError::not_found(Entity::Library, id))?;
        if current.version == version {
          return Ok(current);
        }

        let next = Library { version, updated_at: Utc::now(), ..current };
        tx.execute(
          "UPDATE libraries SET version = ?2, updated_at = ?3 WHERE id = ?1",
          rusqlite::params![id_str, next.version, encode_dt(next.updated_at)],
        )?;
        ctx.check()?;
        tx.commit()?;
        Ok(next)
      })
      .await?;

    debug!(library_id = %id, version = %library.version, %actor, "library version set");
    Ok(library)
  }

  async fn get_library(&self, id: Uuid) -> Result<Option<Library>> {
    let id_str = encode_uuid(id);
    self.with_conn(move |conn| select_library(conn, &id_str)).await
  }

  async fn list_libraries(&self) -> Result<Vec<Library>> {
    self
      .with_conn(|conn| {
        query_all(
          conn,
          &format!("SELECT {LIBRARY_COLUMNS} FROM libraries ORDER BY name"),
          [],
          RawLibrary::from_row,
          RawLibrary::into_library,
        )
      })
      .await
  }

  // ── Specs ─────────────────────────────────────────────────────────────────

  async fn create_spec(&self, ctx: CallContext, input: NewSpec) -> Result<Spec> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    input.validate()?;
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

    let row = spec.clone();
    self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        tx.execute(
          "INSERT INTO specs (id, slug, issue, content, tags, updates, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            encode_uuid(row.id),
            row.slug,
            row.issue,
            row.content,
            encode_tags(&row.tags),
            encode_history(&row.updates)?,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        )
        .map_err(|e| write_error(e, Entity::Spec, &row.slug))?;
        ctx.check()?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(spec_id = %spec.id, slug = %spec.slug, %actor, "spec created");
    Ok(spec)
  }

  async fn update_spec(&self, ctx: CallContext, id: Uuid, patch: SpecPatch) -> Result<Spec> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    let recorder = self.recorder;
    let id_str = encode_uuid(id);

    let (spec, changed) = self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        let current = select_spec(&tx, &id_str)?
          .ok_or_else(|| CatalogError::not_found(Entity::Spec, id))?;
        let Some(next) = recorder.record_spec(&current, &patch, &ctx.actor, Utc::now())? else {
          return Ok((current, false));
        };
        next.updates.ensure_appends_one(&current.updates, "updates")?;

        tx.execute(
          "UPDATE specs SET content = ?2, tags = ?3, issue = ?4, updates = ?5, updated_at = ?6
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            next.content,
            encode_tags(&next.tags),
            next.issue,
            encode_history(&next.updates)?,
            encode_dt(next.updated_at),
          ],
        )
        .map_err(|e| write_error(e, Entity::Spec, &id_str))?;
        ctx.check()?;
        tx.commit()?;
        Ok((next, true))
      })
      .await?;

    if changed {
      debug!(spec_id = %id, updates = spec.updates.len(), %actor, "spec updated");
    }
    Ok(spec)
  }

  async fn delete_spec(&self, ctx: CallContext, id: Uuid) -> Result<()> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    let id_str = encode_uuid(id);

    self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        ensure_spec_exists(&tx, id)?;
        let impls: usize = tx.query_row(
          "SELECT COUNT(*) FROM impls WHERE spec_id = ?1",
          [&id_str],
          |row| row.get(0),
        )?;
        if impls > 0 {
          return Err(CatalogError::InUse { spec_id: id, impls }.into());
        }
        tx.execute("DELETE FROM specs WHERE id = ?1", [&id_str])?;
        ctx.check()?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(spec_id = %id, %actor, "spec deleted");
    Ok(())
  }

  async fn get_spec(&self, id: Uuid) -> Result<Option<Spec>> {
    let id_str = encode_uuid(id);
    self.with_conn(move |conn| select_spec(conn, &id_str)).await
  }

  async fn get_spec_by_slug(&self, slug: String) -> Result<Option<Spec>> {
    self
      .with_conn(move |conn| {
        query_one(
          conn,
          &format!("SELECT {SPEC_COLUMNS} FROM specs WHERE slug = ?1"),
          [slug],
          RawSpec::from_row,
          RawSpec::into_spec,
        )
      })
      .await
  }

  async fn list_specs(&self) -> Result<Vec<Spec>> {
    self
      .with_conn(|conn| {
        query_all(
          conn,
          &format!("SELECT {SPEC_COLUMNS} FROM specs ORDER BY slug"),
          [],
          RawSpec::from_row,
          RawSpec::into_spec,
        )
      })
      .await
  }

  // ── Impls ─────────────────────────────────────────────────────────────────

  async fn create_impl(&self, ctx: CallContext, input: NewImpl) -> Result<Impl> {
    ctx.check()?;
    let actor = ctx.actor.clone();
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

    let row = imp.clone();
    self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        ensure_spec_exists(&tx, row.spec_id)?;
        ensure_library_exists(&tx, row.library_id)?;
        ensure_pair_free(&tx, row.spec_id, row.library_id, None)?;

        let id_str = encode_uuid(row.id);
        tx.execute(
          &format!(
            "INSERT INTO impls ({IMPL_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
          ),
          rusqlite::params![
            id_str,
            encode_uuid(row.spec_id),
            encode_uuid(row.library_id),
            row.code,
            row.quality_score.map(i64::from),
            row.review_image_description,
            encode_checklist(row.review_criteria_checklist.as_ref())?,
            row.review_verdict.map(|v| v.to_string()),
            encode_tags(&row.impl_tags),
            encode_history(&row.history)?,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        )
        .map_err(|e| write_error(e, Entity::Impl, &id_str))?;
        ctx.check()?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(
      impl_id = %imp.id,
      spec_id = %imp.spec_id,
      library_id = %imp.library_id,
      %actor,
      "impl created"
    );
    Ok(imp)
  }

  async fn update_impl(&self, ctx: CallContext, id: Uuid, patch: ImplPatch) -> Result<Impl> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    let recorder = self.recorder;
    let id_str = encode_uuid(id);

    let (imp, changed) = self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        let current = select_impl(&tx, &id_str)?
          .ok_or_else(|| CatalogError::not_found(Entity::Impl, id))?;
        let Some(next) = recorder.record_impl(&current, &patch, &ctx.actor, Utc::now())? else {
          return Ok((current, false));
        };
        next.history.ensure_appends_one(&current.history, "history")?;

        if next.spec_id != current.spec_id || next.library_id != current.library_id {
          ensure_spec_exists(&tx, next.spec_id)?;
          ensure_library_exists(&tx, next.library_id)?;
          ensure_pair_free(&tx, next.spec_id, next.library_id, Some(id))?;
        }

        tx.execute(
          "UPDATE impls SET
             spec_id = ?2, library_id = ?3, code = ?4, quality_score = ?5,
             review_image_description = ?6, review_criteria_checklist = ?7,
             review_verdict = ?8, impl_tags = ?9, history = ?10, updated_at = ?11
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            encode_uuid(next.spec_id),
            encode_uuid(next.library_id),
            next.code,
            next.quality_score.map(i64::from),
            next.review_image_description,
            encode_checklist(next.review_criteria_checklist.as_ref())?,
            next.review_verdict.map(|v| v.to_string()),
            encode_tags(&next.impl_tags),
            encode_history(&next.history)?,
            encode_dt(next.updated_at),
          ],
        )
        .map_err(|e| write_error(e, Entity::Impl, &id_str))?;
        ctx.check()?;
        tx.commit()?;
        Ok((next, true))
      })
      .await?;

    if changed {
      debug!(impl_id = %id, history = imp.history.len(), %actor, "impl updated");
    }
    Ok(imp)
  }

  async fn delete_impl(&self, ctx: CallContext, id: Uuid) -> Result<()> {
    ctx.check()?;
    let actor = ctx.actor.clone();
    let id_str = encode_uuid(id);

    self
      .with_conn(move |conn| {
        let tx = begin(conn)?;
        if tx.execute("DELETE FROM impls WHERE id = ?1", [&id_str])? == 0 {
          return Err(CatalogError::not_found(Entity::Impl, id).into());
        }
        ctx.check()?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(impl_id = %id, %actor, "impl deleted");
    Ok(())
  }

  async fn get_impl(&self, id: Uuid) -> Result<Option<Impl>> {
    let id_str = encode_uuid(id);
    self.with_conn(move |conn| select_impl(conn, &id_str)).await
  }

  async fn list_impls_for_spec(&self, spec_id: Uuid) -> Result<Vec<Impl>> {
    let id_str = encode_uuid(spec_id);
    self
      .with_conn(move |conn| {
        query_all(
          conn,
          &format!("SELECT {IMPL_COLUMNS} FROM impls WHERE spec_id = ?1 ORDER BY id"),
          [id_str],
          RawImpl::from_row,
          RawImpl::into_impl,
        )
      })
      .await
  }
}

// ─── CatalogQuery impl ───────────────────────────────────────────────────────

/// Containment scans over the JSON tag columns, for dimensions that have no
/// side-table index. `?1` is the dimension and `?2` the value.
const SPEC_TAG_SCAN: &str = "EXISTS (SELECT 1 FROM json_each(specs.tags) d, json_each(d.value) v
          WHERE d.key = ?1 AND v.value = ?2)";
const IMPL_TAG_SCAN: &str = "EXISTS (SELECT 1 FROM json_each(impls.impl_tags) d, json_each(d.value) v
          WHERE d.key = ?1 AND v.value = ?2)";

impl CatalogQuery for SqliteStore {
  async fn find_specs_by_tag(&self, dimension: String, value: String) -> Result<Vec<Spec>> {
    let predicate = if is_spec_dimension(&dimension) {
      "id IN (SELECT spec_id FROM spec_tag_index WHERE dimension = ?1 AND value = ?2)"
    } else {
      SPEC_TAG_SCAN
    };

    self
      .with_conn(move |conn| {
        query_all(
          conn,
          &format!("SELECT {SPEC_COLUMNS} FROM specs WHERE {predicate} ORDER BY slug"),
          [dimension, value],
          RawSpec::from_row,
          RawSpec::into_spec,
        )
      })
      .await
  }

  async fn find_impls_by_impl_tag(&self, dimension: String, value: String) -> Result<Vec<Impl>> {
    let predicate = if is_impl_dimension(&dimension) {
      "id IN (SELECT impl_id FROM impl_tag_index WHERE dimension = ?1 AND value = ?2)"
    } else {
      IMPL_TAG_SCAN
    };

    self
      .with_conn(move |conn| {
        query_all(
          conn,
          &format!("SELECT {IMPL_COLUMNS} FROM impls WHERE {predicate} ORDER BY id"),
          [dimension, value],
          RawImpl::from_row,
          RawImpl::into_impl,
        )
      })
      .await
  }

  async fn top_impls_by_quality(&self, limit: usize, filter: ImplFilter) -> Result<Vec<Impl>> {
    if limit == 0 {
      return Ok(Vec::new());
    }
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let library_id = filter.library_id.map(encode_uuid);
    let spec_id = filter.spec_id.map(encode_uuid);
    let (dimension, value) = filter.tag.map(|t| (t.dimension, t.value)).unzip();

    self
      .with_conn(move |conn| {
        query_all(
          conn,
          &format!(
            "SELECT {IMPL_COLUMNS} FROM impls
             WHERE (?3 IS NULL OR library_id = ?3)
               AND (?4 IS NULL OR spec_id = ?4)
               AND (?1 IS NULL OR {IMPL_TAG_SCAN})
             ORDER BY quality_score IS NULL, quality_score DESC, id ASC
             LIMIT ?5"
          ),
          rusqlite::params![dimension, value, library_id, spec_id, limit],
          RawImpl::from_row,
          RawImpl::into_impl,
        )
      })
      .await
  }

  async fn get_impl_review(&self, id: Uuid) -> Result<ImplReview> {
    let imp = self
      .get_impl(id)
      .await?
      .ok_or_else(|| CatalogError::not_found(Entity::Impl, id))?;
    Ok(imp.review())
  }

  async fn lookup(&self, spec_slug: String, library_name: String) -> Result<Option<Impl>> {
    self
      .with_conn(move |conn| {
        query_one(
          conn,
          &format!(
            "SELECT {IMPL_COLUMNS} FROM impls
             WHERE spec_id = (SELECT id FROM specs WHERE slug = ?1)
               AND library_id = (SELECT id FROM libraries WHERE name = ?2)"
          ),
          [spec_slug, library_name],
          RawImpl::from_row,
          RawImpl::into_impl,
        )
      })
      .await
  }
}
