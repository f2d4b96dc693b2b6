//! Per-call context threaded through every mutation.
//!
//! Carries the caller identity recorded in revision events and the
//! cancellation signals a caller may fire while an operation is in flight.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use crate::{Error, Result};

/// A shareable flag a caller sets to abandon in-flight operations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Who is calling, and until when the result is still wanted.
#[derive(Debug, Clone)]
pub struct CallContext {
  /// Human handle or agent id; copied into every revision event.
  pub actor:    String,
  pub cancel:   CancelToken,
  pub deadline: Option<Instant>,
}

impl CallContext {
  pub fn new(actor: impl Into<String>) -> Self {
    Self {
      actor:    actor.into(),
      cancel:   CancelToken::new(),
      deadline: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.deadline = Some(Instant::now() + timeout);
    self
  }

  pub fn with_cancel(mut self, token: CancelToken) -> Self {
    self.cancel = token;
    self
  }

  /// Fails with [`Error::Cancelled`] once the token fired or the deadline
  /// passed. Backends call this right before committing.
  pub fn check(&self) -> Result<()> {
    let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
    if self.cancel.is_cancelled() || expired {
      return Err(Error::Cancelled);
    }
    Ok(())
  }
}

impl Default for CallContext {
  fn default() -> Self { Self::new("anonymous") }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fresh_context_passes() {
    assert!(CallContext::new("agent-7").check().is_ok());
  }

  #[test]
  fn fired_token_is_seen_by_clones() {
    let token = CancelToken::new();
    let ctx = CallContext::new("agent-7").with_cancel(token.clone());
    token.cancel();
    assert!(matches!(ctx.clone().check(), Err(Error::Cancelled)));
  }

  #[test]
  fn elapsed_deadline_cancels() {
    let ctx = CallContext::new("agent-7").with_timeout(Duration::ZERO);
    assert!(matches!(ctx.check(), Err(Error::Cancelled)));
  }
}
