//! Server configuration: TOML file overlaid with `IDENT_*` environment
//! variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use ident_api::ApiConfig;
use ident_store_sqlite::StoreOptions;
use serde::Deserialize;

const ENV_PREFIX: &str = "IDENT";

/// Everything the binary reads at startup. Every key has a default, so an
/// empty file (or no file) is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  #[serde(default = "default_store_path")]
  pub store_path:             PathBuf,
  #[serde(default = "default_transient_retries")]
  pub transient_retries:      usize,
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms:        u64,
  #[serde(default)]
  pub expose_internal_errors: bool,
  /// Allowed CORS origins. Empty means any origin.
  #[serde(default)]
  pub cors_origins:           Vec<String>,
  /// How long in-flight requests may run after a shutdown signal.
  #[serde(default = "default_shutdown_timeout_secs")]
  pub shutdown_timeout_secs:  u64,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3001 }
fn default_store_path() -> PathBuf { PathBuf::from("ident.db") }
fn default_transient_retries() -> usize { 1 }
fn default_busy_timeout_ms() -> u64 { 5000 }
fn default_shutdown_timeout_secs() -> u64 { 10 }

impl ServerConfig {
  /// Read `path` if it exists, then apply environment overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("cors_origins"),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// The store path with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      transient_retries: self.transient_retries,
      busy_timeout:      Duration::from_millis(self.busy_timeout_ms),
    }
  }

  pub fn shutdown_grace(&self) -> Duration { Duration::from_secs(self.shutdown_timeout_secs) }

  pub fn api_config(&self) -> ApiConfig {
    ApiConfig { expose_internal_errors: self.expose_internal_errors }
  }
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
