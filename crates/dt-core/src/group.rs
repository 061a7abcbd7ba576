//! Groups (working groups, areas, programs) and the roles people hold in them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub group_id:   Uuid,
  pub acronym:    String,
  pub name:       String,
  /// `wg`, `rg`, `area`, `program`, `team`, ...
  pub group_type: String,
  /// The enclosing group; for a working group, its area.
  pub parent_id:  Option<Uuid>,
}

/// Input to [`crate::store::CommunityStore::add_group`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
  pub acronym:    String,
  #[serde(default)]
  pub name:       String,
  #[serde(default = "default_group_type")]
  pub group_type: String,
  #[serde(default)]
  pub parent_id:  Option<Uuid>,
}

fn default_group_type() -> String { "wg".to_owned() }

impl NewGroup {
  pub fn new(acronym: impl Into<String>, group_type: impl Into<String>) -> Self {
    let acronym = acronym.into();
    Self {
      name: acronym.clone(),
      acronym,
      group_type: group_type.into(),
      parent_id: None,
    }
  }

  pub fn with_parent(mut self, parent_id: Uuid) -> Self {
    self.parent_id = Some(parent_id);
    self
  }
}

/// Roles whose holders may manage the group's community list.
pub const LIST_MANAGER_ROLES: &[&str] = &["chair", "delegate", "secr", "ad", "lead"];

pub fn can_manage_group_list(roles: &[String]) -> bool {
  roles.iter().any(|r| LIST_MANAGER_ROLES.contains(&r.as_str()))
}
