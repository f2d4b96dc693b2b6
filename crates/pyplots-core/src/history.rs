//! Revision events and the append-only arrays that hold them.
//!
//! Every mutation of a spec or impl produces exactly one [`RevisionEvent`]
//! describing the fields it changed. Events live in the row's own `updates`
//! (specs) or `history` (impls) array; the array position is the
//! authoritative order, even when two timestamps coincide.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::{
  Error, Result,
  implementation::{Impl, ImplPatch},
  spec::{Spec, SpecPatch},
};

// ─── Events ──────────────────────────────────────────────────────────────────

/// The `{before, after}` pair for one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
  pub before: Value,
  pub after:  Value,
}

/// One immutable entry in a row's history array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionEvent {
  pub timestamp:      DateTime<Utc>,
  pub actor:          String,
  pub changed_fields: BTreeMap<String, FieldChange>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason:         Option<String>,
}

// ─── History ─────────────────────────────────────────────────────────────────

/// An append-only sequence of revision events.
///
/// There is deliberately no way to obtain a mutable reference to a stored
/// event; the only mutation is [`History::append`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<RevisionEvent>);

impl History {
  pub fn new() -> Self { Self::default() }

  pub fn append(&mut self, event: RevisionEvent) { self.0.push(event); }

  pub fn entries(&self) -> &[RevisionEvent] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn last(&self) -> Option<&RevisionEvent> { self.0.last() }

  /// Checks that `self` is `stored` with exactly one event appended.
  ///
  /// Backends call this before persisting so that a past entry can never be
  /// rewritten or dropped by a write.
  pub fn ensure_appends_one(&self, stored: &History, field: &str) -> Result<()> {
    if self.0.len() != stored.0.len() + 1 || self.0[..stored.0.len()] != stored.0[..] {
      return Err(Error::invariant(
        field,
        format!(
          "history must extend the stored {} entries by exactly one",
          stored.0.len()
        ),
      ));
    }
    Ok(())
  }
}

// ─── Large-body policy ───────────────────────────────────────────────────────

/// Controls how `content` and `code` bodies are captured in events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPolicy {
  /// Bodies longer than this many bytes are recorded as a content hash.
  /// `None` always stores full bodies.
  pub hash_bodies_over: Option<usize>,
}

impl HistoryPolicy {
  /// Snapshot a text body for an event.
  pub fn body_snapshot(&self, body: &str) -> Value {
    match self.hash_bodies_over {
      Some(limit) if body.len() > limit => content_hash(body),
      _ => Value::String(body.to_owned()),
    }
  }
}

/// Stable content fingerprint: `{"sha256": <hex>, "bytes": <len>}`.
pub fn content_hash(body: &str) -> Value {
  let digest = Sha256::digest(body.as_bytes());
  json!({ "sha256": hex::encode(digest), "bytes": body.len() })
}

// ─── Change tracking ─────────────────────────────────────────────────────────

/// Accumulates the field changes a patch produces against a current row.
#[derive(Debug, Default)]
struct ChangeSet {
  fields: BTreeMap<String, FieldChange>,
}

impl ChangeSet {
  /// Apply `next` to `slot` if it differs, recording the change.
  fn track<T>(&mut self, name: &str, slot: &mut T, next: Option<&T>) -> Result<()>
  where
    T: Clone + PartialEq + Serialize,
  {
    match next {
      Some(next) if *next != *slot => {
        let before = serde_json::to_value(&*slot)?;
        let after = serde_json::to_value(next)?;
        *slot = next.clone();
        self.fields.insert(name.to_owned(), FieldChange { before, after });
      }
      _ => {}
    }
    Ok(())
  }

  /// Like [`ChangeSet::track`] for large text bodies subject to the policy.
  fn track_body(
    &mut self,
    policy: &HistoryPolicy,
    name: &str,
    slot: &mut String,
    next: Option<&String>,
  ) {
    if let Some(next) = next
      && *next != *slot
    {
      let before = policy.body_snapshot(slot);
      let after = policy.body_snapshot(next);
      *slot = next.clone();
      self.fields.insert(name.to_owned(), FieldChange { before, after });
    }
  }

  fn into_event(
    self,
    actor: &str,
    reason: Option<&String>,
    now: DateTime<Utc>,
  ) -> Option<RevisionEvent> {
    (!self.fields.is_empty()).then(|| RevisionEvent {
      timestamp:      now,
      actor:          actor.to_owned(),
      changed_fields: self.fields,
      reason:         reason.cloned(),
    })
  }
}

// ─── Recorder ────────────────────────────────────────────────────────────────

/// Computes the next state of a row plus the event describing the change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recorder {
  pub policy: HistoryPolicy,
}

impl Recorder {
  pub fn new(policy: HistoryPolicy) -> Self { Self { policy } }

  /// Apply `patch` to `current`. Returns `None` when the patch leaves every
  /// field unchanged; otherwise the updated spec with one event appended to
  /// `updates`.
  pub fn record_spec(
    &self,
    current: &Spec,
    patch: &SpecPatch,
    actor: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<Spec>> {
    let mut next = current.clone();
    let mut changes = ChangeSet::default();

    changes.track_body(&self.policy, "content", &mut next.content, patch.content.as_ref());
    changes.track("tags", &mut next.tags, patch.tags.as_ref())?;
    changes.track("issue", &mut next.issue, patch.issue.as_ref())?;

    let Some(event) = changes.into_event(actor, patch.reason.as_ref(), now) else {
      return Ok(None);
    };
    next.updates.append(event);
    next.updated_at = now;
    Ok(Some(next))
  }

  /// Apply `patch` to `current`. Returns `None` for a no-op patch; otherwise
  /// the updated impl with one event appended to `history`.
  pub fn record_impl(
    &self,
    current: &Impl,
    patch: &ImplPatch,
    actor: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<Impl>> {
    let mut next = current.clone();
    let mut changes = ChangeSet::default();

    changes.track("spec_id", &mut next.spec_id, patch.spec_id.as_ref())?;
    changes.track("library_id", &mut next.library_id, patch.library_id.as_ref())?;
    changes.track_body(&self.policy, "code", &mut next.code, patch.code.as_ref());
    changes.track("quality_score", &mut next.quality_score, patch.quality_score.as_ref())?;
    changes.track(
      "review_image_description",
      &mut next.review_image_description,
      patch.review_image_description.as_ref(),
    )?;
    changes.track(
      "review_criteria_checklist",
      &mut next.review_criteria_checklist,
      patch.review_criteria_checklist.as_ref(),
    )?;
    changes.track("review_verdict", &mut next.review_verdict, patch.review_verdict.as_ref())?;
    changes.track("impl_tags", &mut next.impl_tags, patch.impl_tags.as_ref())?;

    let Some(event) = changes.into_event(actor, patch.reason.as_ref(), now) else {
      return Ok(None);
    };
    next.history.append(event);
    next.updated_at = now;
    Ok(Some(next))
  }
}
