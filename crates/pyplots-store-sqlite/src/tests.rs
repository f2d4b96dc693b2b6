//! Integration tests for `SqliteStore` and the migration engine against
//! in-memory databases.

use std::{
  io,
  sync::{Arc, Mutex},
  time::Duration,
};

use pyplots_core::{
  context::{CallContext, CancelToken},
  implementation::{ImplPatch, NewImpl, QualityScore, Verdict},
  spec::{NewSpec, SpecPatch},
  store::{CatalogQuery, CatalogStore, ImplFilter, TagFilter},
  tags::{Tags, MAX_TAG_VALUES},
  Classify, ErrorKind,
};
use rusqlite::Connection;
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

use crate::{
  describe_schema,
  migrate::CONNECTION_PRAGMAS,
  schema::{Migration, MIGRATIONS},
  Migrator, SqliteStore,
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn ctx() -> CallContext { CallContext::new("tester") }

fn tags(dimension: &str, values: &[&str]) -> Tags {
  Tags::from_pairs([(dimension, values.iter().copied())]).unwrap()
}

/// Fixture: matplotlib 3.10, spec `bar-basic`, and an impl scored 92.
async fn seeded(s: &SqliteStore) -> (Uuid, Uuid, Uuid) {
  let lib = s
    .create_library(ctx(), "matplotlib".into(), "3.10".into())
    .await
    .unwrap();
  let spec = s
    .create_spec(ctx(), NewSpec::new("bar-basic", "# Bar", tags("plot_type", &["bar"])))
    .await
    .unwrap();
  let imp = s
    .create_impl(
      ctx(),
      NewImpl::new(spec.id, lib.id, "...py").with_score(QualityScore::new(92).unwrap()),
    )
    .await
    .unwrap();
  (lib.id, spec.id, imp.id)
}

/// Collects formatted log output so tests can inspect it.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
  fn contents(&self) -> String { String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned() }
}

impl io::Write for LogBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl<'a> MakeWriter<'a> for LogBuffer {
  type Writer = LogBuffer;

  fn make_writer(&'a self) -> Self::Writer { self.clone() }
}

// ─── Libraries ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn mutations_log_entity_and_actor() {
  let logs = LogBuffer::default();
  let subscriber = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_ansi(false)
    .with_writer(logs.clone())
    .finish();
  let _guard = tracing::subscriber::set_default(subscriber);

  let s = store().await;
  let lib = s
    .create_library(CallContext::new("release-bot"), "plotly".into(), "6.0".into())
    .await
    .unwrap();
  s.upsert_library_version(CallContext::new("maintainer"), lib.id, "6.1".into())
    .await
    .unwrap();

  let out = logs.contents();
  assert!(out.contains("library created"), "{out}");
  assert!(out.contains("actor=release-bot"), "{out}");
  assert!(out.contains("actor=maintainer"), "{out}");
  assert!(out.contains(&lib.id.to_string()), "{out}");
}

#[tokio::test]
async fn create_and_list_libraries() {
  let s = store().await;
  s.create_library(ctx(), "seaborn".into(), "0.13".into()).await.unwrap();
  s.create_library(ctx(), "altair".into(), "5.4".into()).await.unwrap();

  let names: Vec<String> = s
    .list_libraries()
    .await
    .unwrap()
    .into_iter()
    .map(|l| l.name)
    .collect();
  assert_eq!(names, ["altair", "seaborn"]);
}

#[tokio::test]
async fn duplicate_library_name_conflicts() {
  let s = store().await;
  s.create_library(ctx(), "plotly".into(), "5.0".into()).await.unwrap();
  let err = s
    .create_library(ctx(), "plotly".into(), "6.0".into())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn upsert_library_version_updates_row() {
  let s = store().await;
  let lib = s.create_library(ctx(), "bokeh".into(), "3.4".into()).await.unwrap();

  let bumped = s.upsert_library_version(ctx(), lib.id, "3.6".into()).await.unwrap();
  assert_eq!(bumped.version, "3.6");
  assert_eq!(s.get_library(lib.id).await.unwrap().unwrap().version, "3.6");

  let err = s
    .upsert_library_version(ctx(), Uuid::new_v4(), "1.0".into())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn blank_library_version_is_rejected() {
  let s = store().await;
  let err = s
    .create_library(ctx(), "pygal".into(), "  ".into())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvariantViolation);
}

// ─── Catalog flows ────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_impl_for_pair_conflicts() {
  let s = store().await;
  let (lib, spec, _) = seeded(&s).await;

  let err = s
    .create_impl(ctx(), NewImpl::new(spec, lib, "other.py"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert_eq!(s.list_impls_for_spec(spec).await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_impl_appends_one_event() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;

  let patch = ImplPatch::from_json(&json!({"quality_score": 95, "reason": "rerun"})).unwrap();
  let updated = s.update_impl(CallContext::new("ci-bot"), imp, patch).await.unwrap();

  assert_eq!(updated.quality_score, Some(QualityScore::new(95).unwrap()));
  assert_eq!(updated.history.len(), 1);
  let event = updated.history.last().unwrap();
  assert_eq!(event.actor, "ci-bot");
  assert_eq!(event.reason.as_deref(), Some("rerun"));
  let change = &event.changed_fields["quality_score"];
  assert_eq!(change.before, json!(92));
  assert_eq!(change.after, json!(95));
  assert_eq!(event.changed_fields.len(), 1);

  let stored = s.get_impl(imp).await.unwrap().unwrap();
  assert_eq!(stored, updated);
}

#[tokio::test]
async fn find_specs_by_tag_matches_containment() {
  let s = store().await;
  for (slug, plot) in [("line-basic", "line"), ("bar-stacked", "bar"), ("bar-basic", "bar")] {
    s.create_spec(ctx(), NewSpec::new(slug, "# x", tags("plot_type", &[plot])))
      .await
      .unwrap();
  }

  let slugs: Vec<String> = s
    .find_specs_by_tag("plot_type".into(), "bar".into())
    .await
    .unwrap()
    .into_iter()
    .map(|s| s.slug)
    .collect();
  assert_eq!(slugs, ["bar-basic", "bar-stacked"]);
}

#[tokio::test]
async fn delete_spec_blocked_while_referenced() {
  let s = store().await;
  let (_, spec, imp) = seeded(&s).await;

  let err = s.delete_spec(ctx(), spec).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InUse);

  s.delete_impl(ctx(), imp).await.unwrap();
  s.delete_spec(ctx(), spec).await.unwrap();
  assert!(s.get_spec(spec).await.unwrap().is_none());

  // the slug is free again
  s.create_spec(ctx(), NewSpec::new("bar-basic", "# Bar", Tags::new()))
    .await
    .unwrap();
}

#[tokio::test]
async fn verdict_outside_vocabulary_is_rejected() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;

  let err = ImplPatch::from_json(&json!({"review_verdict": "MAYBE"})).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvariantViolation);
  assert_eq!(err.record().field.as_deref(), Some("review_verdict"));

  let patch = ImplPatch::from_json(&json!({"review_verdict": "APPROVED"})).unwrap();
  let updated = s.update_impl(ctx(), imp, patch).await.unwrap();
  assert_eq!(updated.review_verdict, Some(Verdict::Approved));
  assert_eq!(updated.history.len(), 1);
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_patch_twice_records_once() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;
  let patch = ImplPatch::from_json(&json!({"code": "print('v2')"})).unwrap();

  s.update_impl(ctx(), imp, patch.clone()).await.unwrap();
  let again = s.update_impl(ctx(), imp, patch).await.unwrap();
  assert_eq!(again.history.len(), 1);
}

#[tokio::test]
async fn reason_only_patch_is_a_noop() {
  let s = store().await;
  let (_, spec, _) = seeded(&s).await;
  let before = s.get_spec(spec).await.unwrap().unwrap();

  let patch = SpecPatch::from_json(&json!({"reason": "nothing to see"})).unwrap();
  let after = s.update_spec(ctx(), spec, patch).await.unwrap();
  assert_eq!(after, before);
}

#[tokio::test]
async fn spec_updates_grow_by_one_per_change() {
  let s = store().await;
  let (_, spec, _) = seeded(&s).await;

  let first = SpecPatch::from_json(&json!({"content": "# Bar v2", "issue": 42})).unwrap();
  let spec1 = s.update_spec(ctx(), spec, first).await.unwrap();
  assert_eq!(spec1.updates.len(), 1);
  assert_eq!(spec1.issue, Some(42));

  let second = SpecPatch::from_json(&json!({"issue": null})).unwrap();
  let spec2 = s.update_spec(ctx(), spec, second).await.unwrap();
  assert_eq!(spec2.updates.len(), 2);
  assert_eq!(spec2.updates.entries()[..1], spec1.updates.entries()[..]);
  assert_eq!(spec2.issue, None);
  assert_eq!(spec2.updates.entries()[1].changed_fields["issue"].before, json!(42));
}

#[tokio::test]
async fn concurrent_identical_updates_serialize() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;
  let patch = ImplPatch::from_json(&json!({"quality_score": 80})).unwrap();

  let (a, b) = tokio::join!(
    s.update_impl(ctx(), imp, patch.clone()),
    s.update_impl(ctx(), imp, patch.clone()),
  );
  a.unwrap();
  b.unwrap();
  assert_eq!(s.get_impl(imp).await.unwrap().unwrap().history.len(), 1);
}

#[tokio::test]
async fn schema_rejects_shortened_history() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;
  let patch = ImplPatch::from_json(&json!({"quality_score": 10})).unwrap();
  s.update_impl(ctx(), imp, patch).await.unwrap();

  let id = imp.to_string();
  let err = s
    .with_conn(move |conn| {
      conn.execute("UPDATE impls SET history = '[]' WHERE id = ?1", [id])?;
      Ok(())
    })
    .await
    .unwrap_err();
  assert!(err.to_string().contains("append-only"), "{err}");
  assert_eq!(s.get_impl(imp).await.unwrap().unwrap().history.len(), 1);
}

#[tokio::test]
async fn schema_rejects_rewritten_past_event() {
  let s = store().await;
  let (_, spec, imp) = seeded(&s).await;
  let patch = ImplPatch::from_json(&json!({"quality_score": 10})).unwrap();
  s.update_impl(ctx(), imp, patch).await.unwrap();
  let patch = SpecPatch::from_json(&json!({"content": "# Bar v2"})).unwrap();
  s.update_spec(ctx(), spec, patch).await.unwrap();

  let id = imp.to_string();
  let err = s
    .with_conn(move |conn| {
      conn.execute(
        "UPDATE impls SET history = json_set(history, '$[0].actor', 'forger') WHERE id = ?1",
        [id],
      )?;
      Ok(())
    })
    .await
    .unwrap_err();
  assert!(err.to_string().contains("append-only"), "{err}");

  let id = spec.to_string();
  let err = s
    .with_conn(move |conn| {
      conn.execute(
        "UPDATE specs SET updates = json_array(json('{}')) WHERE id = ?1",
        [id],
      )?;
      Ok(())
    })
    .await
    .unwrap_err();
  assert!(err.to_string().contains("append-only"), "{err}");

  let imp = s.get_impl(imp).await.unwrap().unwrap();
  assert_eq!(imp.history.entries()[0].actor, "tester");

  // appending through the store still passes the trigger
  let patch = ImplPatch::from_json(&json!({"quality_score": 11})).unwrap();
  let imp = s.update_impl(ctx(), imp.id, patch).await.unwrap();
  assert_eq!(imp.history.len(), 2);
}

#[tokio::test]
async fn large_bodies_are_hashed_when_configured() {
  let dir = std::env::temp_dir().join(format!("pyplots-{}.db", Uuid::new_v4()));
  let policy = pyplots_core::history::HistoryPolicy { hash_bodies_over: Some(16) };
  let s = SqliteStore::open_with(&dir, policy).await.unwrap();
  let (_, _, imp) = seeded(&s).await;

  let long = "x".repeat(64);
  let patch = ImplPatch::from_json(&json!({"code": long})).unwrap();
  let updated = s.update_impl(ctx(), imp, patch).await.unwrap();
  let change = &updated.history.last().unwrap().changed_fields["code"];
  assert_eq!(change.before, json!("...py"));
  assert_eq!(change.after["bytes"], json!(64));
  assert!(change.after["sha256"].is_string());

  drop(s);
  let _ = std::fs::remove_file(&dir);
}

// ─── Re-parenting ────────────────────────────────────────────────────────────

#[tokio::test]
async fn reparent_onto_taken_pair_conflicts() {
  let s = store().await;
  let (lib, spec, _) = seeded(&s).await;
  let other = s
    .create_spec(ctx(), NewSpec::new("line-basic", "# Line", Tags::new()))
    .await
    .unwrap();
  let second = s
    .create_impl(ctx(), NewImpl::new(other.id, lib, "line.py"))
    .await
    .unwrap();

  let patch = ImplPatch { spec_id: Some(spec), ..Default::default() };
  let err = s.update_impl(ctx(), second.id, patch).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let patch = ImplPatch { library_id: Some(Uuid::new_v4()), ..Default::default() };
  let err = s.update_impl(ctx(), second.id, patch).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  assert!(s.get_impl(second.id).await.unwrap().unwrap().history.is_empty());
}

#[tokio::test]
async fn create_impl_requires_parents() {
  let s = store().await;
  let (lib, spec, _) = seeded(&s).await;

  let err = s
    .create_impl(ctx(), NewImpl::new(Uuid::new_v4(), lib, "x"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  let err = s
    .create_impl(ctx(), NewImpl::new(spec, Uuid::new_v4(), "x"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_write_leaves_no_trace() {
  let s = store().await;
  let token = CancelToken::new();
  token.cancel();

  let err = s
    .create_library(ctx().with_cancel(token), "matplotlib".into(), "3.10".into())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Cancelled);
  assert!(s.list_libraries().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_deadline_leaves_row_untouched() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;

  let patch = ImplPatch::from_json(&json!({"quality_score": 1})).unwrap();
  let late = ctx().with_timeout(Duration::ZERO);
  let err = s.update_impl(late, imp, patch).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Cancelled);

  let stored = s.get_impl(imp).await.unwrap().unwrap();
  assert_eq!(stored.quality_score, Some(QualityScore::new(92).unwrap()));
  assert!(stored.history.is_empty());
}

// ─── Tags ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tag_list_boundary_is_enforced() {
  let s = store().await;
  let values: Vec<String> = (0..MAX_TAG_VALUES).map(|i| format!("v{i}")).collect();
  let at_limit = json!({ "features": values });
  let tags = Tags::from_json(&at_limit, "tags").unwrap();
  s.create_spec(ctx(), NewSpec::new("many-features", "# x", tags))
    .await
    .unwrap();

  let over: Vec<String> = (0..=MAX_TAG_VALUES).map(|i| format!("v{i}")).collect();
  let err = SpecPatch::from_json(&json!({ "tags": { "features": over } })).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::TagShapeError);
}

#[tokio::test]
async fn unknown_dimension_or_value_returns_empty() {
  let s = store().await;
  seeded(&s).await;

  assert!(s
    .find_specs_by_tag("colour".into(), "bar".into())
    .await
    .unwrap()
    .is_empty());
  assert!(s
    .find_specs_by_tag("plot_type".into(), "pie".into())
    .await
    .unwrap()
    .is_empty());
}

#[tokio::test]
async fn unindexed_dimension_is_scanned() {
  let s = store().await;
  s.create_spec(ctx(), NewSpec::new("heat", "# x", tags("audience", &["beginner"])))
    .await
    .unwrap();

  let found = s
    .find_specs_by_tag("audience".into(), "beginner".into())
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn impl_tag_index_follows_updates() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;

  let patch =
    ImplPatch::from_json(&json!({"impl_tags": {"techniques": ["annotations", "twin-axes"]}}))
      .unwrap();
  s.update_impl(ctx(), imp, patch).await.unwrap();
  let hits = s
    .find_impls_by_impl_tag("techniques".into(), "twin-axes".into())
    .await
    .unwrap();
  assert_eq!(hits.iter().map(|i| i.id).collect::<Vec<_>>(), [imp]);

  let patch = ImplPatch::from_json(&json!({"impl_tags": {"techniques": ["annotations"]}})).unwrap();
  s.update_impl(ctx(), imp, patch).await.unwrap();
  assert!(s
    .find_impls_by_impl_tag("techniques".into(), "twin-axes".into())
    .await
    .unwrap()
    .is_empty());
}

// ─── Ranking, review, lookup ─────────────────────────────────────────────────

#[tokio::test]
async fn top_impls_orders_by_score_with_nulls_last() {
  let s = store().await;
  let lib = s.create_library(ctx(), "matplotlib".into(), "3.10".into()).await.unwrap();
  let mut ids = Vec::new();
  for (slug, score) in [("a", Some(70)), ("b", None), ("c", Some(90)), ("d", Some(70))] {
    let spec = s
      .create_spec(ctx(), NewSpec::new(slug, "# x", Tags::new()))
      .await
      .unwrap();
    let mut input = NewImpl::new(spec.id, lib.id, "x");
    input.quality_score = score.map(|n| QualityScore::new(n).unwrap());
    ids.push(s.create_impl(ctx(), input).await.unwrap().id);
  }

  let top = s.top_impls_by_quality(10, ImplFilter::default()).await.unwrap();
  let scores: Vec<Option<u8>> = top.iter().map(|i| i.quality_score.map(|q| q.get())).collect();
  assert_eq!(scores, [Some(90), Some(70), Some(70), None]);
  assert!(top[1].id < top[2].id);

  let two = s.top_impls_by_quality(2, ImplFilter::default()).await.unwrap();
  assert_eq!(two.len(), 2);
  assert!(s.top_impls_by_quality(0, ImplFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn top_impls_with_all_null_scores() {
  let s = store().await;
  let lib = s.create_library(ctx(), "plotnine".into(), "0.14".into()).await.unwrap();
  for slug in ["a", "b", "c"] {
    let spec = s
      .create_spec(ctx(), NewSpec::new(slug, "# x", Tags::new()))
      .await
      .unwrap();
    s.create_impl(ctx(), NewImpl::new(spec.id, lib.id, "x")).await.unwrap();
  }

  let top = s.top_impls_by_quality(10, ImplFilter::default()).await.unwrap();
  assert_eq!(top.len(), 3);
  assert!(top.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn top_impls_respects_filter() {
  let s = store().await;
  let (lib, spec, imp) = seeded(&s).await;
  let other_lib = s.create_library(ctx(), "seaborn".into(), "0.13".into()).await.unwrap();
  let mut input = NewImpl::new(spec, other_lib.id, "sns.py");
  input.impl_tags = Tags::from_pairs([("styling", ["dark"])]).unwrap();
  let tagged = s.create_impl(ctx(), input).await.unwrap();

  let by_lib = ImplFilter { library_id: Some(lib), ..Default::default() };
  let top = s.top_impls_by_quality(10, by_lib).await.unwrap();
  assert_eq!(top.iter().map(|i| i.id).collect::<Vec<_>>(), [imp]);

  let by_tag = ImplFilter {
    tag: Some(TagFilter { dimension: "styling".into(), value: "dark".into() }),
    ..Default::default()
  };
  let top = s.top_impls_by_quality(10, by_tag).await.unwrap();
  assert_eq!(top.iter().map(|i| i.id).collect::<Vec<_>>(), [tagged.id]);
}

#[tokio::test]
async fn review_roundtrips_and_missing_is_not_found() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;

  let patch = ImplPatch::from_json(&json!({
    "review_verdict": "REJECTED",
    "review_image_description": "legend overlaps the bars",
    "review_criteria_checklist": {"legend": false, "axes_labelled": true},
  }))
  .unwrap();
  s.update_impl(ctx(), imp, patch).await.unwrap();

  let review = s.get_impl_review(imp).await.unwrap();
  assert_eq!(review.verdict, Some(Verdict::Rejected));
  assert_eq!(review.image_description.as_deref(), Some("legend overlaps the bars"));
  assert_eq!(review.criteria_checklist.unwrap()["legend"], json!(false));

  let err = s.get_impl_review(Uuid::new_v4()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn lookup_by_slug_and_library_name() {
  let s = store().await;
  let (_, _, imp) = seeded(&s).await;

  let found = s.lookup("bar-basic".into(), "matplotlib".into()).await.unwrap();
  assert_eq!(found.map(|i| i.id), Some(imp));
  assert!(s
    .lookup("bar-basic".into(), "seaborn".into())
    .await
    .unwrap()
    .is_none());
}

// ─── Migrations ──────────────────────────────────────────────────────────────

fn blank() -> Connection {
  let conn = Connection::open_in_memory().unwrap();
  conn.execute_batch(CONNECTION_PRAGMAS).unwrap();
  conn
}

#[test]
fn fresh_database_upgrades_to_head() {
  let mut conn = blank();
  let migrator = Migrator::default();
  assert_eq!(migrator.current(&conn).unwrap(), None);

  let applied = migrator.upgrade(&mut conn, "head").unwrap();
  assert_eq!(applied, ["001", "002", "003", "004", "005"]);
  assert_eq!(migrator.current(&conn).unwrap().as_deref(), Some("005"));
  assert!(migrator.upgrade(&mut conn, "head").unwrap().is_empty());

  let history = migrator.history(&conn).unwrap();
  assert!(history.iter().all(|r| r.applied));
  assert!(history.last().unwrap().current);
}

#[test]
fn rename_revision_moves_every_index() {
  let mut conn = blank();
  let migrator = Migrator::default();
  migrator.upgrade(&mut conn, "002").unwrap();
  let before = describe_schema(&conn).unwrap();
  assert!(before.has_index("implementations", "uq_implementations_spec_library"));

  migrator.upgrade(&mut conn, "003").unwrap();
  let after = describe_schema(&conn).unwrap();
  assert!(!after.has_table("implementations"));
  for index in [
    "uq_impls_spec_library",
    "ix_impls_spec_id",
    "ix_impls_library_id",
    "ix_impls_quality_score",
  ] {
    assert!(after.has_index("impls", index), "{index}");
  }
  assert!(after.tables["impls"].indexes["uq_impls_spec_library"].unique);
}

#[test]
fn history_revision_round_trips() {
  let mut conn = blank();
  let migrator = Migrator::default();
  migrator.upgrade(&mut conn, "003").unwrap();
  let before = describe_schema(&conn).unwrap();

  assert_eq!(migrator.upgrade(&mut conn, "004").unwrap(), ["004"]);
  let during = describe_schema(&conn).unwrap();
  assert!(during.has_column("specs", "updates"));
  assert!(during.has_column("impls", "history"));

  assert_eq!(migrator.downgrade(&mut conn, "003").unwrap(), ["004"]);
  assert_eq!(describe_schema(&conn).unwrap(), before);
  assert_eq!(migrator.current(&conn).unwrap().as_deref(), Some("003"));
}

#[test]
fn every_revision_round_trips() {
  let mut conn = blank();
  let migrator = Migrator::default();
  assert_eq!(migrator.current(&conn).unwrap(), None);
  for rev in MIGRATIONS {
    let before = describe_schema(&conn).unwrap();
    migrator.upgrade(&mut conn, rev.revision).unwrap();
    migrator
      .downgrade(&mut conn, rev.down_revision.unwrap_or("base"))
      .unwrap();
    assert_eq!(describe_schema(&conn).unwrap(), before, "revision {}", rev.revision);
    migrator.upgrade(&mut conn, rev.revision).unwrap();
  }
  assert_eq!(migrator.current(&conn).unwrap().as_deref(), Some("005"));

  migrator.downgrade(&mut conn, "base").unwrap();
  assert_eq!(migrator.current(&conn).unwrap(), None);
  let empty = describe_schema(&conn).unwrap();
  assert_eq!(empty.tables.keys().collect::<Vec<_>>(), ["schema_revision"]);
  assert!(empty.triggers.is_empty());
}

#[test]
fn backfill_indexes_existing_rows() {
  let mut conn = blank();
  let migrator = Migrator::default();
  migrator.upgrade(&mut conn, "004").unwrap();
  conn
    .execute(
      "INSERT INTO specs (id, slug, content, tags, created_at, updated_at)
       VALUES ('s1', 'bar-basic', '# Bar', '{\"plot_type\":[\"bar\"]}', 'now', 'now')",
      [],
    )
    .unwrap();

  migrator.upgrade(&mut conn, "005").unwrap();
  let indexed: i64 = conn
    .query_row(
      "SELECT COUNT(*) FROM spec_tag_index WHERE dimension = 'plot_type' AND value = 'bar'",
      [],
      |row| row.get(0),
    )
    .unwrap();
  assert_eq!(indexed, 1);
}

#[test]
fn wrong_direction_and_unknown_targets() {
  let mut conn = blank();
  let migrator = Migrator::default();
  migrator.upgrade(&mut conn, "head").unwrap();

  let err = migrator.upgrade(&mut conn, "003").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvariantViolation);
  let err = migrator.downgrade(&mut conn, "999").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::UnknownRevision);

  conn
    .execute("UPDATE schema_revision SET revision = 'zzz'", [])
    .unwrap();
  let err = migrator.upgrade(&mut conn, "head").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::UnknownRevision);
}

static FAILING: &[Migration] = &[
  Migration {
    revision:      "001",
    down_revision: None,
    description:   "first table",
    upgrade:       "CREATE TABLE a (x INTEGER);",
    downgrade:     "DROP TABLE a;",
  },
  Migration {
    revision:      "002",
    down_revision: Some("001"),
    description:   "fails halfway through",
    upgrade:       "CREATE TABLE b (x INTEGER); INSERT INTO missing VALUES (1);",
    downgrade:     "DROP TABLE b;",
  },
];

#[test]
fn failed_revision_rolls_back_alone() {
  let mut conn = blank();
  let migrator = Migrator::new(FAILING);

  let err = migrator.upgrade(&mut conn, "head").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ApplyFailed);
  assert!(err.to_string().contains("002"), "{err}");

  assert_eq!(migrator.current(&conn).unwrap().as_deref(), Some("001"));
  let schema = describe_schema(&conn).unwrap();
  assert!(schema.has_table("a"));
  assert!(!schema.has_table("b"));
}

static BRANCHED: &[Migration] = &[
  Migration {
    revision:      "001",
    down_revision: None,
    description:   "root",
    upgrade:       "",
    downgrade:     "",
  },
  Migration {
    revision:      "002a",
    down_revision: Some("001"),
    description:   "left",
    upgrade:       "",
    downgrade:     "",
  },
  Migration {
    revision:      "002b",
    down_revision: Some("001"),
    description:   "right",
    upgrade:       "",
    downgrade:     "",
  },
];

#[test]
fn branched_chain_is_refused() {
  let mut conn = blank();
  let err = Migrator::new(BRANCHED).upgrade(&mut conn, "head").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BrokenChain);
  assert_eq!(Migrator::new(BRANCHED).current(&conn).unwrap(), None);
}
