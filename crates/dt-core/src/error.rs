//! Error types for `dt-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("document not found: {0}")]
  DocumentNotFound(Uuid),

  #[error("community list not found: {0}")]
  ListNotFound(Uuid),

  #[error("search rule not found: {0}")]
  RuleNotFound(Uuid),

  #[error("invalid name pattern {pattern:?}: {source}")]
  InvalidPattern {
    pattern: String,
    #[source]
    source:  regex::Error,
  },

  #[error("unknown rule type: {0:?}")]
  UnknownRuleType(String),

  #[error("rule {rule_type} is missing its {field}")]
  IncompleteRule {
    rule_type: String,
    field:     &'static str,
  },

  #[error("unknown notification policy: {0:?}")]
  UnknownNotifyOn(String),

  #[error("unknown doc event type discriminant: {0:?}")]
  UnknownEventType(String),

  #[error("mail delivery failed: {0}")]
  Mail(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Box an arbitrary backend error into [`Error::Store`].
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
