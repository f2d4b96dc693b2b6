//! Runtime configuration, layered from an optional TOML file and
//! `PYPLOTS_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use pyplots_core::history::HistoryPolicy;
use serde::Deserialize;

/// Everything the binary reads from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_database_path")]
  pub database_path: PathBuf,
  #[serde(default = "default_host")]
  pub host:          String,
  #[serde(default = "default_port")]
  pub port:          u16,
  #[serde(default)]
  pub history:       HistorySettings,
  #[serde(default = "default_templates_dir")]
  pub templates_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistorySettings {
  /// Bodies longer than this many bytes are recorded as a content hash.
  pub hash_bodies_over: Option<usize>,
}

fn default_database_path() -> PathBuf { PathBuf::from("pyplots.db") }

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8000 }

fn default_templates_dir() -> PathBuf { PathBuf::from("prompts") }

impl Settings {
  /// Read `path` (if it exists) under the environment. Nested keys use a
  /// double underscore, e.g. `PYPLOTS_HISTORY__HASH_BODIES_OVER`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("PYPLOTS")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Settings = raw
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.database_path = expand_tilde(&settings.database_path);
    settings.templates_dir = expand_tilde(&settings.templates_dir);
    Ok(settings)
  }

  pub fn history_policy(&self) -> HistoryPolicy {
    HistoryPolicy { hash_bodies_over: self.history.hash_bodies_over }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
