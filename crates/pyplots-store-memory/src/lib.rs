//! In-memory backend for the pyplots catalog.
//!
//! Implements the same [`CatalogStore`](pyplots_core::store::CatalogStore)
//! and [`CatalogQuery`](pyplots_core::store::CatalogQuery) contracts as the
//! SQLite backend so callers can be exercised without a database.

mod store;

pub use store::MemoryStore;
