//! Resolution of `/community/{kind}/{key}` to the list it names.
//!
//! A personal key is an email address or a name alias; a group key is the
//! group's acronym. The list itself may not exist yet: an owner without a
//! saved list reads as an empty, unsaved one until the first write creates
//! it.

use dt_core::{
  group::can_manage_group_list,
  list::{CommunityList, ListOwner, group_list_name, personal_list_name},
  person::{Person, Resolution, resolve_person},
  store::CommunityStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, Candidate};

/// The `{kind}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
  Personal,
  Group,
}

impl ListKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Personal => "personal",
      Self::Group => "group",
    }
  }
}

/// Resolve a free-text person identifier, turning ambiguity into a
/// disambiguation error that lists every candidate.
pub async fn resolve_identifier<S: CommunityStore>(
  store: &S,
  identifier: &str,
  preferred: Option<Uuid>,
) -> Result<Person, ApiError> {
  let candidates = store.lookup_persons(identifier).await.map_err(ApiError::store)?;
  match resolve_person(candidates, preferred) {
    Resolution::Unique(person) => Ok(person),
    Resolution::NotFound => Err(ApiError::NotFound(format!("no person matches {identifier:?}"))),
    Resolution::Ambiguous(people) => {
      let mut candidates = Vec::with_capacity(people.len());
      for person in people {
        let emails = store
          .person_emails(person.person_id)
          .await
          .map_err(ApiError::store)?
          .into_iter()
          .map(|e| e.address)
          .collect();
        candidates.push(Candidate { name: person.name, username: person.username, emails });
      }
      tracing::debug!(%identifier, candidates = candidates.len(), "ambiguous person lookup");
      Err(ApiError::Ambiguous(identifier.to_owned(), candidates))
    }
  }
}

/// The list addressed by a request path.
#[derive(Debug, Clone)]
pub struct Target {
  pub kind:  ListKind,
  pub key:   String,
  pub owner: ListOwner,
  /// The list title, also for a list that is not saved yet.
  pub title: String,
  pub list:  Option<CommunityList>,
}

impl Target {
  /// Look the owner up and load its list, if saved.
  ///
  /// `preferred` (the requesting user) settles a personal key that several
  /// people share.
  pub async fn resolve<S: CommunityStore>(
    store: &S,
    kind: ListKind,
    key: &str,
    preferred: Option<Uuid>,
  ) -> Result<Self, ApiError> {
    let (owner, title) = match kind {
      ListKind::Personal => {
        let person = resolve_identifier(store, key, preferred).await?;
        (ListOwner::Person(person.person_id), personal_list_name(&person.name))
      }
      ListKind::Group => {
        let group = store
          .get_group_by_acronym(key)
          .await
          .map_err(ApiError::store)?
          .ok_or_else(|| ApiError::NotFound(format!("group {key} not found")))?;
        (ListOwner::Group(group.group_id), group_list_name(&group.name))
      }
    };

    let list = store.get_list(owner).await.map_err(ApiError::store)?;
    let title = list.as_ref().map_or(title, |l| l.long_name.clone());
    Ok(Self { kind, key: key.to_owned(), owner, title, list })
  }

  /// The saved list, or 404.
  pub fn saved(&self) -> Result<&CommunityList, ApiError> {
    self
      .list
      .as_ref()
      .ok_or_else(|| ApiError::NotFound(format!("{} has no saved list", self.key)))
  }

  /// The saved list, creating it on first use.
  pub async fn ensure_saved<S: CommunityStore>(
    &mut self,
    store: &S,
  ) -> Result<CommunityList, ApiError> {
    if let Some(list) = &self.list {
      return Ok(list.clone());
    }
    let list = store.create_list(self.owner).await.map_err(ApiError::store)?;
    tracing::info!(list = %list.list_id, title = %list.long_name, "saved community list");
    self.list = Some(list.clone());
    Ok(list)
  }

  /// Whether `person` may change this list: its owner, or someone holding a
  /// managing role in the owning group.
  pub async fn can_manage<S: CommunityStore>(
    &self,
    store: &S,
    person: &Person,
  ) -> Result<bool, ApiError> {
    match self.owner {
      ListOwner::Person(id) => Ok(id == person.person_id),
      ListOwner::Group(group_id) => {
        let roles = store
          .roles_in_group(group_id, person.person_id)
          .await
          .map_err(ApiError::store)?;
        Ok(can_manage_group_list(&roles))
      }
    }
  }

  /// 403 unless `person` may change this list.
  pub async fn require_manager<S: CommunityStore>(
    &self,
    store: &S,
    person: &Person,
  ) -> Result<(), ApiError> {
    if self.can_manage(store, person).await? {
      Ok(())
    } else {
      tracing::debug!(user = %person.person_id, list = %self.key, "list change refused");
      Err(ApiError::Forbidden)
    }
  }

  /// Site-relative URL of this list's page, or of one of its sub-pages.
  pub fn url(&self, page: &str) -> String {
    format!(
      "/community/{}/{}/{page}",
      self.kind.as_str(),
      urlencoding::encode(&self.key)
    )
  }
}
