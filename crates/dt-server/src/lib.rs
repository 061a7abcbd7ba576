//! Server assembly for the community tracker.
//!
//! Turns a [`ServerConfig`] into the `dt-api` router backed by
//! [`SqliteStore`], wrapped in request tracing. The binary in `main.rs` only
//! parses arguments, loads configuration and serves the result.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use dt_api::{AppConfig, AppState};
use dt_core::notify::Mailer;
use dt_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DT_`-prefixed environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:             String,
  #[serde(default = "default_port")]
  pub port:             u16,
  pub base_url:         String,
  pub store_path:       PathBuf,
  pub proceedings_root: PathBuf,
  /// Defaults to `<base_url>/media`.
  #[serde(default)]
  pub media_url:        Option<String>,
  pub mail_from:        String,
  #[serde(default = "default_feed_days")]
  pub feed_days:        i64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8000 }

fn default_feed_days() -> i64 { 14 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// The per-request settings handed to the router, with `~` expanded.
  pub fn app_config(&self) -> AppConfig {
    let base_url = self.base_url.trim_end_matches('/').to_owned();
    AppConfig {
      media_url:        self.media_url.clone().unwrap_or_else(|| format!("{base_url}/media")),
      base_url,
      proceedings_root: expand_tilde(&self.proceedings_root),
      mail_from:        self.mail_from.clone(),
      feed_days:        self.feed_days,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The full application: API routes plus request tracing.
pub fn app(store: SqliteStore, mailer: Arc<dyn Mailer>, config: &ServerConfig) -> Router {
  let state = AppState::new(store, mailer, config.app_config());
  dt_api::router(state).layer(TraceLayer::new_for_http())
}
