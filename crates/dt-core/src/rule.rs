//! Search rules: typed predicates that select documents for a community list.
//!
//! Each rule kind carries exactly the fields it needs. The state namespace a
//! rule inspects is implied by its kind, so a rule can only ever compare a
//! document's state within the right namespace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{DocumentFacts, State, StateType},
  name_index::NamePattern,
};

/// The slug `group_exp` rules always require in the draft namespace.
pub const EXPIRED: &str = "expired";

// ─── RuleKind ────────────────────────────────────────────────────────────────

/// The typed payload of a search rule. The variant name serves as the
/// `rule_type` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum RuleKind {
  /// Drafts of a group in a draft state.
  Group { group_id: Uuid, state: String },
  /// Documents of a group in an RFC state.
  GroupRfc { group_id: Uuid, state: String },
  /// Expired drafts of a group.
  GroupExp { group_id: Uuid },
  /// Drafts of any group whose parent is the given area.
  Area { group_id: Uuid, state: String },
  /// Drafts in an IESG state, regardless of group.
  StateIesg { state: String },
  /// Drafts with the person among their authors.
  Author { person_id: Uuid, state: String },
  /// RFCs with the person among their authors.
  AuthorRfc { person_id: Uuid, state: String },
  /// Drafts whose responsible AD is the person.
  Ad { person_id: Uuid, state: String },
  /// Drafts whose shepherd email belongs to the person.
  Shepherd { person_id: Uuid, state: String },
  /// Drafts whose name matches the pattern.
  NameContains { text: NamePattern, state: String },
}

impl RuleKind {
  /// The discriminant string stored in the `rule_type` column.
  pub fn rule_type(&self) -> &'static str {
    match self {
      Self::Group { .. } => "group",
      Self::GroupRfc { .. } => "group_rfc",
      Self::GroupExp { .. } => "group_exp",
      Self::Area { .. } => "area",
      Self::StateIesg { .. } => "state_iesg",
      Self::Author { .. } => "author",
      Self::AuthorRfc { .. } => "author_rfc",
      Self::Ad { .. } => "ad",
      Self::Shepherd { .. } => "shepherd",
      Self::NameContains { .. } => "name_contains",
    }
  }

  /// The single state a matching document must currently be in.
  pub fn required_state(&self) -> State {
    match self {
      Self::GroupRfc { state, .. } | Self::AuthorRfc { state, .. } => {
        State::new(StateType::Rfc, state.clone())
      }
      Self::StateIesg { state } => State::new(StateType::DraftIesg, state.clone()),
      Self::GroupExp { .. } => State::new(StateType::Draft, EXPIRED),
      Self::Group { state, .. }
      | Self::Area { state, .. }
      | Self::Author { state, .. }
      | Self::Ad { state, .. }
      | Self::Shepherd { state, .. }
      | Self::NameContains { state, .. } => State::new(StateType::Draft, state.clone()),
    }
  }

  /// The group the rule targets, for group-scoped kinds.
  pub fn group_id(&self) -> Option<Uuid> {
    match self {
      Self::Group { group_id, .. }
      | Self::GroupRfc { group_id, .. }
      | Self::GroupExp { group_id }
      | Self::Area { group_id, .. } => Some(*group_id),
      _ => None,
    }
  }

  /// The person the rule targets, for person-scoped kinds.
  pub fn person_id(&self) -> Option<Uuid> {
    match self {
      Self::Author { person_id, .. }
      | Self::AuthorRfc { person_id, .. }
      | Self::Ad { person_id, .. }
      | Self::Shepherd { person_id, .. } => Some(*person_id),
      _ => None,
    }
  }

  pub fn name_pattern(&self) -> Option<&NamePattern> {
    match self {
      Self::NameContains { text, .. } => Some(text),
      _ => None,
    }
  }

  /// Rebuild a rule from its flattened column representation.
  ///
  /// Fails if a field the kind requires is absent or the pattern does not
  /// compile; a stored rule is therefore always complete.
  pub fn from_parts(
    rule_type: &str,
    group_id: Option<Uuid>,
    person_id: Option<Uuid>,
    state_slug: Option<String>,
    text: Option<&str>,
  ) -> Result<Self> {
    let missing = |field: &'static str| Error::IncompleteRule {
      rule_type: rule_type.to_owned(),
      field,
    };
    let group = || group_id.ok_or_else(|| missing("group"));
    let person = || person_id.ok_or_else(|| missing("person"));
    let state = || state_slug.clone().ok_or_else(|| missing("state"));

    Ok(match rule_type {
      "group" => Self::Group { group_id: group()?, state: state()? },
      "group_rfc" => Self::GroupRfc { group_id: group()?, state: state()? },
      "group_exp" => Self::GroupExp { group_id: group()? },
      "area" => Self::Area { group_id: group()?, state: state()? },
      "state_iesg" => Self::StateIesg { state: state()? },
      "author" => Self::Author { person_id: person()?, state: state()? },
      "author_rfc" => Self::AuthorRfc { person_id: person()?, state: state()? },
      "ad" => Self::Ad { person_id: person()?, state: state()? },
      "shepherd" => Self::Shepherd { person_id: person()?, state: state()? },
      "name_contains" => Self::NameContains {
        text:  NamePattern::new(text.ok_or_else(|| missing("text"))?)?,
        state: state()?,
      },
      other => return Err(Error::UnknownRuleType(other.to_owned())),
    })
  }
}

// ─── SearchRule ──────────────────────────────────────────────────────────────

/// A rule belonging to one community list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRule {
  pub rule_id: Uuid,
  pub list_id: Uuid,
  #[serde(flatten)]
  pub kind:    RuleKind,
}

impl SearchRule {
  /// Whether the rule currently matches the document described by `facts`.
  ///
  /// `name_contains` rules consult `facts.name_rule_hits`, which the store
  /// fills from its name index; every other kind is a pure function of the
  /// facts and the rule fields.
  pub fn matches(&self, facts: &DocumentFacts) -> bool {
    if !facts.in_state(&self.kind.required_state()) {
      return false;
    }
    match &self.kind {
      RuleKind::Group { group_id, .. }
      | RuleKind::GroupRfc { group_id, .. }
      | RuleKind::GroupExp { group_id } => facts.group_id == Some(*group_id),
      RuleKind::Area { group_id, .. } => facts.group_parent_id == Some(*group_id),
      RuleKind::StateIesg { .. } => true,
      RuleKind::Author { person_id, .. } | RuleKind::AuthorRfc { person_id, .. } => {
        facts.author_ids.contains(person_id)
      }
      RuleKind::Ad { person_id, .. } => facts.ad_id == Some(*person_id),
      RuleKind::Shepherd { person_id, .. } => facts.shepherd_id == Some(*person_id),
      RuleKind::NameContains { .. } => facts.name_rule_hits.contains(&self.rule_id),
    }
  }
}
