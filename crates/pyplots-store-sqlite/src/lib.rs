//! SQLite backend for the pyplots catalog.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The schema is evolved by the
//! revision chain in [`schema`], applied through [`migrate::Migrator`].

mod encode;
mod store;

pub mod error;
pub mod migrate;
pub mod schema;

pub use error::{Error, Result};
pub use migrate::{describe_schema, Migrator, SchemaDescription};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
