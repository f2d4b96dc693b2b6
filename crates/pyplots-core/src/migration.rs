//! Migration-chain linearization and planning.
//!
//! Engine-agnostic: a backend supplies its revisions (each knowing its own
//! id and predecessor) and executes the plan computed here. The ledger is a
//! single chain; branches, cycles and dangling predecessors are rejected.

use std::collections::{HashMap, HashSet};

use crate::{Error, Result};

/// Alias accepted by upgrade targets for the newest revision.
pub const HEAD: &str = "head";
/// Alias accepted by downgrade targets for "no revision applied".
pub const BASE: &str = "base";

/// One step in the schema-evolution chain.
pub trait Revision {
  fn revision(&self) -> &str;
  fn down_revision(&self) -> Option<&str>;
}

/// Order `revisions` root-first by walking `down_revision` pointers back
/// from the single head.
pub fn linearize<R: Revision>(revisions: &[R]) -> Result<Vec<&R>> {
  let mut by_id: HashMap<&str, &R> = HashMap::with_capacity(revisions.len());
  for rev in revisions {
    if by_id.insert(rev.revision(), rev).is_some() {
      return Err(Error::BrokenChain(format!(
        "revision {} is declared twice",
        rev.revision()
      )));
    }
  }

  let parents: HashSet<&str> = revisions.iter().filter_map(Revision::down_revision).collect();
  let heads: Vec<&R> = revisions
    .iter()
    .filter(|r| !parents.contains(r.revision()))
    .collect();

  let head = match heads.as_slice() {
    [] if revisions.is_empty() => return Ok(Vec::new()),
    [] => return Err(Error::BrokenChain("no head revision (cycle?)".into())),
    [head] => *head,
    many => {
      let ids: Vec<&str> = many.iter().map(|r| r.revision()).collect();
      return Err(Error::BrokenChain(format!("multiple heads: {}", ids.join(", "))));
    }
  };

  let mut chain = Vec::with_capacity(revisions.len());
  let mut seen = HashSet::new();
  let mut cursor = Some(head);
  while let Some(rev) = cursor {
    if !seen.insert(rev.revision()) {
      return Err(Error::BrokenChain(format!("cycle through {}", rev.revision())));
    }
    chain.push(rev);
    cursor = match rev.down_revision() {
      None => None,
      Some(down) => Some(*by_id.get(down).ok_or_else(|| {
        Error::BrokenChain(format!(
          "{} points at missing revision {down}",
          rev.revision()
        ))
      })?),
    };
  }

  if chain.len() != revisions.len() {
    return Err(Error::BrokenChain(format!(
      "{} revision(s) are not reachable from head {}",
      revisions.len() - chain.len(),
      head.revision()
    )));
  }

  chain.reverse();
  Ok(chain)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Upgrade,
  Downgrade,
}

/// The revisions to run, in execution order.
#[derive(Debug)]
pub struct Plan<'a, R> {
  pub direction: Direction,
  pub steps:     Vec<&'a R>,
}

/// Position of `revision` in `chain`, or *UnknownRevision*.
fn position<R: Revision>(chain: &[&R], revision: &str) -> Result<usize> {
  chain
    .iter()
    .position(|r| r.revision() == revision)
    .ok_or_else(|| Error::UnknownRevision(revision.to_owned()))
}

/// Resolve a target name to a chain height (number of applied revisions).
fn height_of<R: Revision>(chain: &[&R], target: &str) -> Result<usize> {
  match target {
    HEAD => Ok(chain.len()),
    BASE => Ok(0),
    id => position(chain, id).map(|i| i + 1),
  }
}

/// Plan the steps that move a database at `current` to `target`.
///
/// `direction` is what the caller asked for; a target on the other side of
/// `current` is refused rather than silently reversed.
pub fn plan<'a, R: Revision>(
  chain: &[&'a R],
  current: Option<&str>,
  target: &str,
  direction: Direction,
) -> Result<Plan<'a, R>> {
  let from = match current {
    None => 0,
    Some(id) => position(chain, id)? + 1,
  };
  let to = height_of(chain, target)?;

  let steps: Vec<&'a R> = match direction {
    Direction::Upgrade if to >= from => chain[from..to].to_vec(),
    Direction::Downgrade if to <= from => chain[to..from].iter().rev().copied().collect(),
    Direction::Upgrade => {
      return Err(Error::invariant(
        "target",
        format!("{target} is behind the current revision; downgrade instead"),
      ));
    }
    Direction::Downgrade => {
      return Err(Error::invariant(
        "target",
        format!("{target} is ahead of the current revision; upgrade instead"),
      ));
    }
  };

  Ok(Plan { direction, steps })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{Classify, ErrorKind};

  #[derive(Debug)]
  struct Rev(&'static str, Option<&'static str>);

  impl Revision for Rev {
    fn revision(&self) -> &str { self.0 }

    fn down_revision(&self) -> Option<&str> { self.1 }
  }

  fn ids<'a>(revs: &[&'a Rev]) -> Vec<&'a str> { revs.iter().map(|r| r.0).collect() }

  fn chain() -> Vec<Rev> {
    // declared out of order on purpose
    vec![
      Rev("003", Some("002")),
      Rev("001", None),
      Rev("004", Some("003")),
      Rev("002", Some("001")),
    ]
  }

  #[test]
  fn linearizes_root_first() {
    let revs = chain();
    assert_eq!(ids(&linearize(&revs).unwrap()), ["001", "002", "003", "004"]);
  }

  #[test]
  fn dangling_pointer_is_a_broken_chain() {
    let revs = vec![Rev("001", None), Rev("003", Some("002"))];
    let err = linearize(&revs).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokenChain);
  }

  #[test]
  fn branch_is_a_broken_chain() {
    let revs = vec![Rev("001", None), Rev("002a", Some("001")), Rev("002b", Some("001"))];
    assert_eq!(linearize(&revs).unwrap_err().kind(), ErrorKind::BrokenChain);
  }

  #[test]
  fn cycle_is_a_broken_chain() {
    let revs = vec![Rev("001", None), Rev("002", Some("003")), Rev("003", Some("002"))];
    assert_eq!(linearize(&revs).unwrap_err().kind(), ErrorKind::BrokenChain);
  }

  #[test]
  fn duplicate_is_a_broken_chain() {
    let revs = vec![Rev("001", None), Rev("001", None)];
    assert_eq!(linearize(&revs).unwrap_err().kind(), ErrorKind::BrokenChain);
  }

  #[test]
  fn upgrade_plan_from_empty_database() {
    let revs = chain();
    let chain = linearize(&revs).unwrap();
    let plan = plan(&chain, None, HEAD, Direction::Upgrade).unwrap();
    assert_eq!(ids(&plan.steps), ["001", "002", "003", "004"]);
  }

  #[test]
  fn upgrade_plan_to_named_target() {
    let revs = chain();
    let chain = linearize(&revs).unwrap();
    let plan = plan(&chain, Some("002"), "003", Direction::Upgrade).unwrap();
    assert_eq!(ids(&plan.steps), ["003"]);

    let noop = super::plan(&chain, Some("004"), HEAD, Direction::Upgrade).unwrap();
    assert!(noop.steps.is_empty());
  }

  #[test]
  fn downgrade_plan_runs_in_reverse_and_stops_at_target() {
    let revs = chain();
    let chain = linearize(&revs).unwrap();
    let plan = plan(&chain, Some("004"), "002", Direction::Downgrade).unwrap();
    assert_eq!(plan.direction, Direction::Downgrade);
    assert_eq!(ids(&plan.steps), ["004", "003"]);

    let all = super::plan(&chain, Some("004"), BASE, Direction::Downgrade).unwrap();
    assert_eq!(ids(&all.steps), ["004", "003", "002", "001"]);
  }

  #[test]
  fn wrong_direction_is_refused() {
    let revs = chain();
    let chain = linearize(&revs).unwrap();
    let err = plan(&chain, Some("003"), "001", Direction::Upgrade).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    let err = plan(&chain, Some("001"), "003", Direction::Downgrade).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
  }

  #[test]
  fn unknown_target_or_current() {
    let revs = chain();
    let chain = linearize(&revs).unwrap();
    let err = plan(&chain, None, "999", Direction::Upgrade).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRevision);
    let err = plan(&chain, Some("999"), HEAD, Direction::Upgrade).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRevision);
  }
}
