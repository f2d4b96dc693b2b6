//! Schema migration engine for the SQLite catalog.
//!
//! The applied revision lives in a one-row `schema_revision` ledger. Every
//! revision runs in its own exclusive transaction together with the ledger
//! update, so a failing script leaves both the schema and the ledger at the
//! last revision that committed.

use std::collections::{BTreeMap, BTreeSet};

use pyplots_core::migration::{self, Direction, HEAD};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use tracing::{info, warn};

use crate::{
  schema::{Migration, LEDGER_DDL, MIGRATIONS},
  Result,
};

/// Connection settings applied to every catalog connection.
pub const CONNECTION_PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

/// One entry of [`Migrator::history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionStatus {
  pub revision:      &'static str,
  pub down_revision: Option<&'static str>,
  pub description:   &'static str,
  pub applied:       bool,
  pub current:       bool,
}

/// Applies a chain of [`Migration`]s to a connection.
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
  migrations: &'static [Migration],
}

impl Default for Migrator {
  fn default() -> Self { Self::new(MIGRATIONS) }
}

impl Migrator {
  pub fn new(migrations: &'static [Migration]) -> Self { Self { migrations } }

  fn chain(&self) -> Result<Vec<&'static Migration>> {
    Ok(migration::linearize(self.migrations)?)
  }

  /// The revision recorded in the ledger, or `None` for an empty database.
  pub fn current(&self, conn: &Connection) -> Result<Option<String>> {
    conn.execute_batch(LEDGER_DDL)?;
    Ok(
      conn
        .query_row("SELECT revision FROM schema_revision", [], |row| row.get(0))
        .optional()?,
    )
  }

  /// Every known revision root-first, marked applied up to the current one.
  pub fn history(&self, conn: &Connection) -> Result<Vec<RevisionStatus>> {
    let chain = self.chain()?;
    let current = self.current(conn)?;
    let height = match current.as_deref() {
      None => 0,
      Some(id) => {
        chain
          .iter()
          .position(|m| m.revision == id)
          .ok_or_else(|| pyplots_core::Error::UnknownRevision(id.to_owned()))?
          + 1
      }
    };

    Ok(
      chain
        .iter()
        .enumerate()
        .map(|(i, m)| RevisionStatus {
          revision:      m.revision,
          down_revision: m.down_revision,
          description:   m.description,
          applied:       i < height,
          current:       i + 1 == height,
        })
        .collect(),
    )
  }

  /// Apply every revision after the current one up to `target` (or
  /// [`HEAD`]). Returns the revisions applied, in order.
  pub fn upgrade(&self, conn: &mut Connection, target: &str) -> Result<Vec<&'static str>> {
    self.run(conn, target, Direction::Upgrade)
  }

  /// Reverse revisions from the current one down to, but not including,
  /// `target` (or every revision for [`migration::BASE`]).
  pub fn downgrade(&self, conn: &mut Connection, target: &str) -> Result<Vec<&'static str>> {
    self.run(conn, target, Direction::Downgrade)
  }

  fn run(
    &self,
    conn: &mut Connection,
    target: &str,
    direction: Direction,
  ) -> Result<Vec<&'static str>> {
    let chain = self.chain()?;
    let current = self.current(conn)?;
    let plan = migration::plan(&chain, current.as_deref(), target, direction)?;

    let mut applied = Vec::with_capacity(plan.steps.len());
    for step in plan.steps {
      apply_step(conn, step, direction)?;
      applied.push(step.revision);
    }
    Ok(applied)
  }
}

/// Upgrade a connection to the newest revision.
pub fn upgrade_to_head(conn: &mut Connection) -> Result<Vec<&'static str>> {
  Migrator::default().upgrade(conn, HEAD)
}

fn apply_step(conn: &mut Connection, step: &Migration, direction: Direction) -> Result<()> {
  let (script, lands_on) = match direction {
    Direction::Upgrade => (step.upgrade, Some(step.revision)),
    Direction::Downgrade => (step.downgrade, step.down_revision),
  };

  let outcome = run_script(conn, script, lands_on);

  match outcome {
    Ok(()) => {
      info!(
        revision = step.revision,
        direction = ?direction,
        "applied schema revision"
      );
      Ok(())
    }
    Err(cause) => {
      warn!(
        revision = step.revision,
        direction = ?direction,
        error = %cause,
        "schema revision failed; rolled back"
      );
      Err(
        pyplots_core::Error::ApplyFailed {
          revision: step.revision.to_owned(),
          cause:    cause.to_string(),
        }
        .into(),
      )
    }
  }
}

fn run_script(
  conn: &mut Connection,
  script: &str,
  lands_on: Option<&str>,
) -> rusqlite::Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
  tx.execute_batch(script)?;
  set_revision(&tx, lands_on)?;
  tx.commit()
}

fn set_revision(conn: &Connection, revision: Option<&str>) -> rusqlite::Result<()> {
  conn.execute("DELETE FROM schema_revision", [])?;
  if let Some(revision) = revision {
    conn.execute(
      "INSERT INTO schema_revision (revision) VALUES (?1)",
      rusqlite::params![revision],
    )?;
  }
  Ok(())
}

// ─── Structural description ──────────────────────────────────────────────────

/// A comparable description of the user-visible schema: tables with their
/// ordered columns and indexes, plus trigger names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescription {
  pub tables:   BTreeMap<String, TableDescription>,
  pub triggers: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
  pub columns: Vec<ColumnDescription>,
  pub indexes: BTreeMap<String, IndexDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
  pub name:        String,
  pub decl_type:   String,
  pub not_null:    bool,
  pub default:     Option<String>,
  pub primary_key: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
  pub unique:  bool,
  pub columns: Vec<String>,
}

impl SchemaDescription {
  pub fn has_table(&self, name: &str) -> bool { self.tables.contains_key(name) }

  pub fn has_column(&self, table: &str, column: &str) -> bool {
    self
      .tables
      .get(table)
      .is_some_and(|t| t.columns.iter().any(|c| c.name == column))
  }

  pub fn has_index(&self, table: &str, index: &str) -> bool {
    self
      .tables
      .get(table)
      .is_some_and(|t| t.indexes.contains_key(index))
  }
}

/// Describe every non-internal table, index and trigger in `conn`.
pub fn describe_schema(conn: &Connection) -> Result<SchemaDescription> {
  let mut description = SchemaDescription::default();

  let tables: Vec<String> = {
    let mut stmt = conn.prepare(
      "SELECT name FROM sqlite_master
       WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
       ORDER BY name",
    )?;
    stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?
  };

  for table in tables {
    let columns = {
      let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk
         FROM pragma_table_info(?1) ORDER BY cid",
      )?;
      stmt
        .query_map([&table], |row| {
          Ok(ColumnDescription {
            name:        row.get(0)?,
            decl_type:   row.get(1)?,
            not_null:    row.get(2)?,
            default:     row.get(3)?,
            primary_key: row.get(4)?,
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };

    let index_names: Vec<(String, bool)> = {
      let mut stmt = conn.prepare("SELECT name, \"unique\" FROM pragma_index_list(?1)")?;
      stmt
        .query_map([&table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?
    };

    let mut indexes = BTreeMap::new();
    for (name, unique) in index_names {
      let mut stmt =
        conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
      let columns = stmt
        .query_map([&name], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      indexes.insert(name, IndexDescription { unique, columns });
    }

    description
      .tables
      .insert(table, TableDescription { columns, indexes });
  }

  let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'trigger'")?;
  description.triggers = stmt
    .query_map([], |row| row.get(0))?
    .collect::<rusqlite::Result<_>>()?;

  Ok(description)
}

/// Open a file-backed connection with the catalog pragmas applied. The
/// schema is left untouched.
pub fn open_connection(path: impl AsRef<std::path::Path>) -> Result<Connection> {
  let conn = Connection::open(path)?;
  conn.execute_batch(CONNECTION_PRAGMAS)?;
  Ok(conn)
}
