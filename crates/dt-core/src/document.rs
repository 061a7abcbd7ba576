//! Documents, their lifecycle states, and the events recorded against them.
//!
//! A document carries at most one current state per state namespace (the
//! draft lifecycle, the IESG process, the RFC series). Rules and
//! notification policies only ever look at a single named state within one
//! namespace.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

// ─── State namespaces ────────────────────────────────────────────────────────

/// A named axis of document lifecycle, each with its own value set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StateType {
  /// `draft`: active, expired, rfc, repl, auth-rm, ietf-rm.
  Draft,
  /// `draft-iesg`: pub-req, ad-eval, lc, iesg-eva, approved, ann, ...
  DraftIesg,
  /// `rfc`: published.
  Rfc,
  /// Stream and other namespaces the rule engine does not interpret.
  Other(String),
}

impl StateType {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Draft => "draft",
      Self::DraftIesg => "draft-iesg",
      Self::Rfc => "rfc",
      Self::Other(s) => s,
    }
  }
}

impl From<String> for StateType {
  fn from(s: String) -> Self {
    match s.as_str() {
      "draft" => Self::Draft,
      "draft-iesg" => Self::DraftIesg,
      "rfc" => Self::Rfc,
      _ => Self::Other(s),
    }
  }
}

impl From<&str> for StateType {
  fn from(s: &str) -> Self { Self::from(s.to_owned()) }
}

impl From<StateType> for String {
  fn from(t: StateType) -> Self { t.as_str().to_owned() }
}

impl std::fmt::Display for StateType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single named state within one namespace, e.g. `draft/active`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
  pub state_type: StateType,
  pub slug:       String,
}

impl State {
  pub fn new(state_type: StateType, slug: impl Into<String>) -> Self {
    Self { state_type, slug: slug.into() }
  }

  pub fn draft(slug: impl Into<String>) -> Self { Self::new(StateType::Draft, slug) }

  pub fn iesg(slug: impl Into<String>) -> Self { Self::new(StateType::DraftIesg, slug) }

  pub fn rfc(slug: impl Into<String>) -> Self { Self::new(StateType::Rfc, slug) }
}

impl std::fmt::Display for State {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.state_type, self.slug)
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub doc_id:   Uuid,
  pub name:     String,
  pub title:    String,
  /// `draft`, `charter`, `slides`, ...
  pub doc_type: String,
  pub rev:      String,
  pub group_id: Option<Uuid>,
  pub ad_id:    Option<Uuid>,
  /// Email address of the document shepherd.
  pub shepherd: Option<String>,
  /// Author person ids in author order.
  pub authors:  Vec<Uuid>,
  pub states:   Vec<State>,
  /// Last modification time; bumped by every recorded event.
  pub time:     DateTime<Utc>,
}

impl Document {
  /// The document's current state in `state_type`, if it has one.
  pub fn state(&self, state_type: &StateType) -> Option<&State> {
    self.states.iter().find(|s| &s.state_type == state_type)
  }
}

/// Input to [`crate::store::CommunityStore::add_document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
  pub name:     String,
  #[serde(default)]
  pub title:    String,
  #[serde(default = "default_doc_type")]
  pub doc_type: String,
  #[serde(default = "default_rev")]
  pub rev:      String,
  pub group_id: Option<Uuid>,
  pub ad_id:    Option<Uuid>,
  pub shepherd: Option<String>,
  #[serde(default)]
  pub authors:  Vec<Uuid>,
  #[serde(default)]
  pub states:   Vec<State>,
}

fn default_doc_type() -> String { "draft".to_owned() }

fn default_rev() -> String { "00".to_owned() }

impl NewDocument {
  /// A draft with no group, people, or states.
  pub fn draft(name: impl Into<String>) -> Self {
    Self {
      name:     name.into(),
      title:    String::new(),
      doc_type: default_doc_type(),
      rev:      default_rev(),
      group_id: None,
      ad_id:    None,
      shepherd: None,
      authors:  Vec::new(),
      states:   Vec::new(),
    }
  }
}

// ─── Match facts ─────────────────────────────────────────────────────────────

/// Everything a search rule may look at when deciding whether it matches a
/// document, resolved through the document's relations.
#[derive(Debug, Clone, Default)]
pub struct DocumentFacts {
  pub doc_id:          Uuid,
  pub name:            String,
  pub group_id:        Option<Uuid>,
  /// Parent of the document's group (the area, for working groups).
  pub group_parent_id: Option<Uuid>,
  pub states:          BTreeMap<StateType, String>,
  pub author_ids:      BTreeSet<Uuid>,
  pub ad_id:           Option<Uuid>,
  /// The person owning the shepherd email address.
  pub shepherd_id:     Option<Uuid>,
  /// `name_contains` rules whose index currently lists this document.
  pub name_rule_hits:  BTreeSet<Uuid>,
}

impl DocumentFacts {
  /// `true` iff the document's state in `state.state_type` is exactly
  /// `state.slug`. A document without that namespace is never in it.
  pub fn in_state(&self, state: &State) -> bool {
    self
      .states
      .get(&state.state_type)
      .is_some_and(|slug| slug == &state.slug)
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// The typed payload of a [`DocEvent`]. The variant name serves as the
/// `event_type` discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DocEventKind {
  ChangedState {
    state: State,
    prev:  Option<State>,
  },
  NewRevision {
    rev: String,
  },
  AddedComment,
}

impl DocEventKind {
  /// The discriminant string stored in the `event_type` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::ChangedState { .. } => "changed_state",
      Self::NewRevision { .. } => "new_revision",
      Self::AddedComment => "added_comment",
    }
  }

  /// Serialise the inner payload (without the type tag).
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from the discriminant and payload stored in the database.
  pub fn from_parts(discriminant: &str, data: serde_json::Value) -> Result<Self> {
    let wrapped = if data.is_null() {
      serde_json::json!({ "type": discriminant })
    } else {
      serde_json::json!({ "type": discriminant, "data": data })
    };
    serde_json::from_value(wrapped)
      .map_err(|_| crate::Error::UnknownEventType(discriminant.to_owned()))
  }
}

/// Something that happened to a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEvent {
  pub event_id: Uuid,
  pub doc_id:   Uuid,
  pub time:     DateTime<Utc>,
  /// The person who caused the event.
  pub by:       Uuid,
  pub kind:     DocEventKind,
  pub desc:     String,
}

impl DocEvent {
  /// The new state, for state-change events.
  pub fn new_state(&self) -> Option<&State> {
    match &self.kind {
      DocEventKind::ChangedState { state, .. } => Some(state),
      _ => None,
    }
  }
}

/// Input to [`crate::store::CommunityStore::add_doc_event`].
#[derive(Debug, Clone)]
pub struct NewDocEvent {
  pub doc_id: Uuid,
  pub by:     Uuid,
  pub kind:   DocEventKind,
  pub desc:   String,
}
