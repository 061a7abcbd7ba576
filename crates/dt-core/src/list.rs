//! Community lists and the email subscriptions attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  group::Group,
  rule::{RuleKind, SearchRule},
  store::CommunityStore,
};

// ─── Owner ───────────────────────────────────────────────────────────────────

/// Who a community list belongs to: exactly one person or one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ListOwner {
  Person(Uuid),
  Group(Uuid),
}

// ─── CommunityList ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityList {
  pub list_id:    Uuid,
  pub owner:      ListOwner,
  /// Human-readable list title, derived from the owner.
  pub long_name:  String,
  pub created_at: DateTime<Utc>,
}

/// Title for a person's list.
pub fn personal_list_name(person_name: &str) -> String {
  format!("Personal I-D list of {person_name}")
}

/// Title for a group's list.
pub fn group_list_name(group_name: &str) -> String {
  format!("I-D list for {group_name}")
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// Which document changes a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyOn {
  All,
  Significant,
}

impl NotifyOn {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::All => "all",
      Self::Significant => "significant",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "all" => Ok(Self::All),
      "significant" => Ok(Self::Significant),
      other => Err(Error::UnknownNotifyOn(other.to_owned())),
    }
  }

  /// Whether a change of the given significance should be delivered.
  pub fn accepts(&self, significant: bool) -> bool {
    match self {
      Self::All => true,
      Self::Significant => significant,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSubscription {
  pub subscription_id: Uuid,
  pub list_id:         Uuid,
  pub email:           String,
  pub notify_on:       NotifyOn,
}

// ─── Group defaults ──────────────────────────────────────────────────────────

/// The rules every group list starts with: the group's active drafts, its
/// published RFCs, and its expired drafts.
pub fn default_group_rules(group_id: Uuid) -> Vec<RuleKind> {
  vec![
    RuleKind::Group { group_id, state: "active".into() },
    RuleKind::GroupRfc { group_id, state: "published".into() },
    RuleKind::GroupExp { group_id },
  ]
}

/// Create `group`'s community list with [`default_group_rules`].
///
/// Returns the existing list untouched if the group already has one.
pub async fn setup_default_community_list_for_group<S: CommunityStore>(
  store: &S,
  group: &Group,
) -> Result<(CommunityList, Vec<SearchRule>)> {
  let owner = ListOwner::Group(group.group_id);
  if let Some(existing) = store.get_list(owner).await.map_err(Error::store)? {
    let rules = store.list_rules(existing.list_id).await.map_err(Error::store)?;
    return Ok((existing, rules));
  }

  let list = store.create_list(owner).await.map_err(Error::store)?;
  let mut rules = Vec::new();
  for kind in default_group_rules(group.group_id) {
    rules.push(store.add_rule(list.list_id, kind).await.map_err(Error::store)?);
  }
  tracing::debug!(acronym = %group.acronym, "created default community list");
  Ok((list, rules))
}
