//! Core types and trait definitions for the pyplots catalog.
//!
//! The catalog indexes plot specs, their per-library implementations, and
//! the append-only history of every edit. This crate is deliberately free of
//! HTTP and database dependencies; backends and front-ends depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod context;
pub mod error;
pub mod history;
pub mod implementation;
pub mod library;
pub mod migration;
pub mod spec;
pub mod store;
pub mod tags;

pub use context::{CallContext, CancelToken};
pub use error::{Classify, Entity, Error, ErrorKind, ErrorRecord, Result};
