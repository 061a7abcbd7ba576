//! People, their email addresses, and free-text identifier resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  pub person_id:  Uuid,
  pub name:       String,
  /// Login name, if the person has an account.
  pub username:   Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
  pub address:   String,
  pub person_id: Uuid,
  pub primary:   bool,
  pub active:    bool,
}

/// Input to [`crate::store::CommunityStore::add_person`].
///
/// The first address becomes the primary one. The person's `name` is always
/// registered as an alias in addition to `aliases`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPerson {
  pub name:     String,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub emails:   Vec<String>,
  #[serde(default)]
  pub aliases:  Vec<String>,
}

impl NewPerson {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Default::default() }
  }

  pub fn with_email(mut self, address: impl Into<String>) -> Self {
    self.emails.push(address.into());
    self
  }

  pub fn with_username(mut self, username: impl Into<String>) -> Self {
    self.username = Some(username.into());
    self
  }
}

/// A stored login: the person it belongs to and their argon2 PHC hash.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub person_id:     Uuid,
  pub password_hash: String,
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Outcome of resolving a free-text identifier (an email address or a name)
/// to a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
  Unique(T),
  NotFound,
  /// More than one entity matched; every candidate is carried so the caller
  /// can present a disambiguation choice.
  Ambiguous(Vec<T>),
}

impl<T> Resolution<T> {
  pub fn is_unique(&self) -> bool { matches!(self, Self::Unique(_)) }
}

/// Resolve lookup `candidates` to one person.
///
/// When several people match and `preferred` (typically the authenticated
/// user) is one of them, that person wins.
pub fn resolve_person(
  mut candidates: Vec<Person>,
  preferred: Option<Uuid>,
) -> Resolution<Person> {
  match candidates.len() {
    0 => Resolution::NotFound,
    1 => Resolution::Unique(candidates.remove(0)),
    _ => match preferred
      .and_then(|id| candidates.iter().position(|p| p.person_id == id))
    {
      Some(idx) => Resolution::Unique(candidates.swap_remove(idx)),
      None => Resolution::Ambiguous(candidates),
    },
  }
}
