//! Fixtures shared by the handler tests.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use dt_core::{
  notify::Outbox,
  person::{NewPerson, Person},
  store::CommunityStore,
};
use dt_store_sqlite::SqliteStore;

use crate::{AppConfig, AppState, auth::hash_password};

/// An in-memory app with one person, "Plain Man" (`plain@example.com`),
/// who logs in as `username` / `password`.
pub async fn state_with_user(username: &str, password: &str) -> (AppState<SqliteStore>, Person) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let person = store
    .add_person(
      NewPerson::new("Plain Man")
        .with_email("plain@example.com")
        .with_username(username),
    )
    .await
    .unwrap();
  store
    .set_credentials(person.person_id, username.to_owned(), hash_password(password).unwrap())
    .await
    .unwrap();

  let state = AppState::new(store, Arc::new(Outbox::new()), AppConfig::default());
  (state, person)
}

/// Swap in an outbox the test can inspect.
pub fn with_outbox(state: AppState<SqliteStore>) -> (AppState<SqliteStore>, Arc<Outbox>) {
  let outbox = Arc::new(Outbox::new());
  let state = AppState { mailer: outbox.clone(), ..state };
  (state, outbox)
}

/// A `Basic` authorization header value.
pub fn basic(username: &str, password: &str) -> String {
  format!("Basic {}", B64.encode(format!("{username}:{password}")))
}
