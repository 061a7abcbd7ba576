//! Error type for `dt-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] dt_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("person not found: {0}")]
  PersonNotFound(uuid::Uuid),

  #[error("document not found: {0}")]
  DocumentNotFound(uuid::Uuid),

  #[error("search rule not found: {0}")]
  RuleNotFound(uuid::Uuid),

  #[error("community list not found: {0}")]
  ListNotFound(uuid::Uuid),

  #[error("rule {0} is not a name_contains rule")]
  NotANameRule(uuid::Uuid),

  #[error("owner already has a community list")]
  ListExists,
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
