//! HTTP surface of the community tracker.
//!
//! Exposes an axum [`Router`] backed by any [`CommunityStore`]: community
//! list views and management, CSV and Atom exports, subscriptions, a small
//! JSON API for seeding people, groups and documents, and meeting
//! proceedings. TLS and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = dt_api::router(AppState::new(store, mailer, config));
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod community;
pub mod documents;
pub mod error;
pub mod etag;
pub mod export;
pub mod proceedings;
pub mod target;

#[cfg(test)]
mod testing;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use dt_core::{notify::Mailer, store::CommunityStore};
use tokio::sync::Mutex;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Settings the handlers need at request time.
#[derive(Debug, Clone)]
pub struct AppConfig {
  /// Public base URL, used for absolute links in feeds.
  pub base_url:         String,
  /// Root of the per-meeting proceedings directories.
  pub proceedings_root: PathBuf,
  /// Public URL the proceedings root is served under.
  pub media_url:        String,
  /// Sender address of notification mail.
  pub mail_from:        String,
  /// How far back the Atom feed reaches.
  pub feed_days:        i64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      base_url:         "http://localhost:8000".to_owned(),
      proceedings_root: PathBuf::from("proceedings"),
      media_url:        "http://localhost:8000/media".to_owned(),
      mail_from:        "noreply@localhost".to_owned(),
      feed_days:        14,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: CommunityStore> {
  pub store:            Arc<S>,
  pub mailer:           Arc<dyn Mailer>,
  pub config:           Arc<AppConfig>,
  /// Serialises writes under the proceedings root.
  pub proceedings_lock: Arc<Mutex<()>>,
}

impl<S: CommunityStore> AppState<S> {
  pub fn new(store: S, mailer: Arc<dyn Mailer>, config: AppConfig) -> Self {
    Self {
      store: Arc::new(store),
      mailer,
      config: Arc::new(config),
      proceedings_lock: Arc::new(Mutex::new(())),
    }
  }
}

impl<S: CommunityStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:            Arc::clone(&self.store),
      mailer:           Arc::clone(&self.mailer),
      config:           Arc::clone(&self.config),
      proceedings_lock: Arc::clone(&self.proceedings_lock),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn router<S>(state: AppState<S>) -> Router<()>
where
  S: CommunityStore + 'static,
{
  Router::new()
    // Community lists
    .route("/community/{kind}/{key}/",                get(community::view::<S>))
    .route(
      "/community/{kind}/{key}/manage",
      get(community::manage::<S>).post(community::manage_action::<S>),
    )
    .route("/community/{kind}/{key}/track/{name}",    post(community::track::<S>))
    .route("/community/{kind}/{key}/untrack/{name}",  post(community::untrack::<S>))
    .route("/community/{kind}/{key}/csv",             get(export::csv::<S>))
    .route("/community/{kind}/{key}/feed",            get(export::feed::<S>))
    .route(
      "/community/{kind}/{key}/subscription",
      get(community::subscription::<S>).post(community::subscription_action::<S>),
    )
    // Seeding API
    .route("/api/persons",                            post(documents::create_person::<S>))
    .route("/api/groups",                             post(documents::create_group::<S>))
    .route("/api/groups/{acronym}/roles",             post(documents::add_role::<S>))
    .route("/api/documents",                          post(documents::create_document::<S>))
    .route("/api/documents/{name}",                   get(documents::get_document::<S>))
    .route("/api/documents/{name}/state",             post(documents::change_state::<S>))
    // Proceedings
    .route("/proceedings/interims",                   post(proceedings::create_interim::<S>))
    .route("/proceedings/{meeting}/{material}/{filename}", put(proceedings::upload::<S>))
    .route("/proceedings/{meeting}/groups/{acronym}", get(proceedings::session_view::<S>))
    .route(
      "/proceedings/{meeting}/groups/{acronym}/{material}",
      post(proceedings::upload_material::<S>),
    )
    .route(
      "/proceedings/{meeting}/groups/{acronym}/{material}/{name}",
      post(proceedings::move_slide::<S>).delete(proceedings::delete_material::<S>),
    )
    .with_state(state)
}
