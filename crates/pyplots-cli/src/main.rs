//! `pyplots` binary.
//!
//! Reads `pyplots.toml` (or the path given with `--config`) and then either
//! manages the schema revision, serves the catalog API over HTTP, or runs
//! one of the small workflow helpers.
//!
//! ```
//! pyplots migrate upgrade head
//! pyplots serve
//! pyplots prompt plot-generate bar-basic matplotlib
//! ```

mod settings;
mod workflow;

use std::{
  io::Read as _,
  path::PathBuf,
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use pyplots_core::migration::HEAD;
use pyplots_store_sqlite::{Migrator, SqliteStore, migrate::open_connection};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "pyplots catalog")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "pyplots.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Inspect or move the database schema revision.
  Migrate {
    #[command(subcommand)]
    action: MigrateAction,
  },
  /// Open the catalog (upgrading it to head) and serve the HTTP API.
  Serve,
  /// Render a prompt template from the templates directory.
  Prompt {
    name: String,
    args: Vec<String>,
  },
  /// Read workflow output on stdin and print its `run_id`, or `null`.
  RunId,
}

#[derive(Subcommand)]
enum MigrateAction {
  /// Print the applied revision.
  Current,
  /// List every revision in the chain.
  History,
  /// Apply revisions up to TARGET.
  Upgrade {
    #[arg(default_value = HEAD)]
    target: String,
  },
  /// Revert revisions down to TARGET (`base` reverts everything).
  Downgrade { target: String },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  match cli.command {
    Command::Migrate { action } => migrate(&settings, action),
    Command::Serve => serve(settings).await,
    Command::Prompt { name, args } => {
      let template = workflow::load_template(&settings.templates_dir, &name)?;
      print!("{}", workflow::render_template(&template, &args));
      Ok(())
    }
    Command::RunId => {
      let mut input = String::new();
      std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
      match workflow::parse_run_id(&input) {
        Some(id) => println!("{id}"),
        None => println!("null"),
      }
      Ok(())
    }
  }
}

// ─── Commands ────────────────────────────────────────────────────────────────

fn migrate(settings: &Settings, action: MigrateAction) -> anyhow::Result<()> {
  let path = &settings.database_path;
  let mut conn = open_connection(path)
    .with_context(|| format!("failed to open database at {path:?}"))?;
  let migrator = Migrator::default();

  match action {
    MigrateAction::Current => {
      let current = migrator.current(&conn)?;
      println!("{}", current.as_deref().unwrap_or("base"));
    }
    MigrateAction::History => {
      for status in migrator.history(&conn)? {
        let marker = if status.current {
          "(current)"
        } else if status.applied {
          "(applied)"
        } else {
          ""
        };
        println!(
          "{} -> {} {} {marker}",
          status.down_revision.unwrap_or("base"),
          status.revision,
          status.description,
        );
      }
    }
    MigrateAction::Upgrade { target } => {
      let applied = migrator.upgrade(&mut conn, &target)?;
      tracing::info!(count = applied.len(), "upgrade finished");
    }
    MigrateAction::Downgrade { target } => {
      let reverted = migrator.downgrade(&mut conn, &target)?;
      tracing::info!(count = reverted.len(), "downgrade finished");
    }
  }
  Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
  let path = &settings.database_path;
  let store = SqliteStore::open_with(path, settings.history_policy())
    .await
    .with_context(|| format!("failed to open store at {path:?}"))?;

  let app = Router::new()
    .merge(pyplots_api::api_router(Arc::new(store)))
    .layer(TraceLayer::new_for_http());
  let address = settings.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
