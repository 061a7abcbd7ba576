//! The `name_contains` pattern type and the events that invalidate its index.
//!
//! Matching a regular expression against every document name on each query
//! does not scale, so stores keep a per-rule index of matching document ids.
//! The index is owned by the store: every store operation that fires one of
//! the [`IndexTrigger`]s rebuilds the affected entries before it returns.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{Error, Result};

/// A validated regular expression applied to document names.
///
/// Matching is unanchored: the pattern may match anywhere in the name.
#[derive(Clone)]
pub struct NamePattern {
  regex: Regex,
}

impl NamePattern {
  pub fn new(text: &str) -> Result<Self> {
    let regex = Regex::new(text).map_err(|source| Error::InvalidPattern {
      pattern: text.to_owned(),
      source,
    })?;
    Ok(Self { regex })
  }

  pub fn as_str(&self) -> &str { self.regex.as_str() }

  pub fn is_match(&self, name: &str) -> bool { self.regex.is_match(name) }
}

impl PartialEq for NamePattern {
  fn eq(&self, other: &Self) -> bool { self.as_str() == other.as_str() }
}

impl Eq for NamePattern {}

impl fmt::Debug for NamePattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("NamePattern").field(&self.as_str()).finish()
  }
}

impl fmt::Display for NamePattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for NamePattern {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for NamePattern {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    NamePattern::new(&text).map_err(serde::de::Error::custom)
  }
}

// ─── Triggers ────────────────────────────────────────────────────────────────

/// The complete set of events after which name index entries must be
/// recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTrigger {
  /// A `name_contains` rule was created: rebuild that rule's entries.
  RuleAdded(Uuid),
  /// A `name_contains` rule's pattern changed: rebuild that rule's entries.
  RuleTextChanged(Uuid),
  /// A document entered the corpus: re-test its name against every rule.
  DocumentAdded(Uuid),
  /// A document's name changed: re-test its name against every rule.
  DocumentRenamed(Uuid),
}

impl IndexTrigger {
  /// The rule whose entries must be rebuilt from the whole corpus, if the
  /// trigger is rule-scoped.
  pub fn rule_scope(&self) -> Option<Uuid> {
    match self {
      Self::RuleAdded(id) | Self::RuleTextChanged(id) => Some(*id),
      Self::DocumentAdded(_) | Self::DocumentRenamed(_) => None,
    }
  }

  /// The document whose entries must be rebuilt against every rule, if the
  /// trigger is document-scoped.
  pub fn document_scope(&self) -> Option<Uuid> {
    match self {
      Self::DocumentAdded(id) | Self::DocumentRenamed(id) => Some(*id),
      Self::RuleAdded(_) | Self::RuleTextChanged(_) => None,
    }
  }
}
