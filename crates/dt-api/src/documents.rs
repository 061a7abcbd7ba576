//! Handlers for the `/api` seeding endpoints and document state changes.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/persons` | Body: [`NewPerson`] plus optional `password` |
//! | `POST` | `/api/groups` | Body: [`NewGroup`]; `?default_list=true` adds the default list |
//! | `POST` | `/api/groups/{acronym}/roles` | Body: `{"person": "<email or name>", "role": "chair"}` |
//! | `POST` | `/api/documents` | Body: [`NewDocument`] |
//! | `GET`  | `/api/documents/{name}` | 404 if not found |
//! | `POST` | `/api/documents/{name}/state` | Auth; body: [`State`]; notifies subscribers |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use dt_core::{
  document::{self, DocEvent, Document, NewDocument},
  group::{Group, NewGroup},
  list::setup_default_community_list_for_group,
  notify::notify_event_to_subscribers,
  person::{NewPerson, Person},
  store::CommunityStore,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::Authenticated, error::ApiError, target::resolve_identifier};

/// Look a document up by name, or 404.
pub async fn document_named<S: CommunityStore>(
  store: &S,
  name: &str,
) -> Result<Document, ApiError> {
  store
    .get_document_by_name(name)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("document {name} not found")))
}

// ─── Persons ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreatePerson {
  #[serde(flatten)]
  pub person:   NewPerson,
  /// Plain-text password; requires `username`. Only its hash is stored.
  #[serde(default)]
  pub password: Option<String>,
}

/// `POST /api/persons`
pub async fn create_person<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Json(body): Json<CreatePerson>,
) -> Result<impl IntoResponse, ApiError> {
  let login = match (&body.person.username, &body.password) {
    (Some(username), Some(password)) => {
      let hash = crate::auth::hash_password(password)
        .map_err(|e| ApiError::BadRequest(format!("cannot hash password: {e}")))?;
      Some((username.clone(), hash))
    }
    (None, Some(_)) => {
      return Err(ApiError::BadRequest("a password needs a username".to_owned()));
    }
    _ => None,
  };

  let person = state.store.add_person(body.person).await.map_err(ApiError::store)?;
  if let Some((username, hash)) = login {
    state
      .store
      .set_credentials(person.person_id, username, hash)
      .await
      .map_err(ApiError::store)?;
  }
  tracing::info!(person = %person.person_id, name = %person.name, "created person");
  Ok((StatusCode::CREATED, Json(person)))
}

// ─── Groups ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateGroupParams {
  #[serde(default)]
  pub default_list: bool,
}

/// `POST /api/groups[?default_list=true]`
pub async fn create_group<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Query(params): Query<CreateGroupParams>,
  Json(body): Json<NewGroup>,
) -> Result<impl IntoResponse, ApiError> {
  let store = state.store.as_ref();
  if store
    .get_group_by_acronym(&body.acronym)
    .await
    .map_err(ApiError::store)?
    .is_some()
  {
    return Err(ApiError::BadRequest(format!("group {} already exists", body.acronym)));
  }
  if let Some(parent_id) = body.parent_id
    && store.get_group(parent_id).await.map_err(ApiError::store)?.is_none()
  {
    return Err(ApiError::BadRequest(format!("unknown parent group {parent_id}")));
  }

  let group = store.add_group(body).await.map_err(ApiError::store)?;
  if params.default_list {
    setup_default_community_list_for_group(store, &group).await?;
  }
  Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Debug, Deserialize)]
pub struct AddRole {
  /// Email address or name of the role holder.
  pub person: String,
  pub role:   String,
}

#[derive(Debug, Serialize)]
pub struct RoleAdded {
  pub group:  Group,
  pub person: Person,
  pub role:   String,
}

/// `POST /api/groups/{acronym}/roles`
pub async fn add_role<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Path(acronym): Path<String>,
  Json(body): Json<AddRole>,
) -> Result<impl IntoResponse, ApiError> {
  let store = state.store.as_ref();
  let group = store
    .get_group_by_acronym(&acronym)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("group {acronym} not found")))?;
  let person = resolve_identifier(store, &body.person, None).await?;

  store
    .add_role(group.group_id, person.person_id, body.role.clone())
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(RoleAdded { group, person, role: body.role })))
}

// ─── Documents ────────────────────────────────────────────────────────────────

/// Reject documents pointing at a group or people that do not exist.
async fn check_document_references<S: CommunityStore>(
  store: &S,
  doc: &NewDocument,
) -> Result<(), ApiError> {
  if let Some(group_id) = doc.group_id
    && store.get_group(group_id).await.map_err(ApiError::store)?.is_none()
  {
    return Err(ApiError::BadRequest(format!("unknown group {group_id}")));
  }
  for person_id in doc.ad_id.iter().chain(&doc.authors) {
    if store.get_person(*person_id).await.map_err(ApiError::store)?.is_none() {
      return Err(ApiError::BadRequest(format!("unknown person {person_id}")));
    }
  }
  Ok(())
}

/// `POST /api/documents`
pub async fn create_document<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewDocument>,
) -> Result<impl IntoResponse, ApiError> {
  let store = state.store.as_ref();
  if store
    .get_document_by_name(&body.name)
    .await
    .map_err(ApiError::store)?
    .is_some()
  {
    return Err(ApiError::BadRequest(format!("document {} already exists", body.name)));
  }
  check_document_references(store, &body).await?;

  let doc = store.add_document(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(doc)))
}

/// `GET /api/documents/{name}`
pub async fn get_document<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Path(name): Path<String>,
) -> Result<Json<Document>, ApiError> {
  Ok(Json(document_named(state.store.as_ref(), &name).await?))
}

#[derive(Debug, Serialize)]
pub struct StateChanged {
  pub event:    DocEvent,
  /// Number of notification messages sent.
  pub notified: usize,
}

/// `POST /api/documents/{name}/state`
pub async fn change_state<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path(name): Path<String>,
  Json(new_state): Json<document::State>,
) -> Result<Json<StateChanged>, ApiError> {
  let store = state.store.as_ref();
  let doc = document_named(store, &name).await?;

  let event = store
    .add_state_change_event(doc.doc_id, user.person_id, new_state)
    .await
    .map_err(ApiError::store)?;
  let notified = notify_event_to_subscribers(
    store,
    state.mailer.as_ref(),
    &state.config.mail_from,
    &event,
  )
  .await?;

  Ok(Json(StateChanged { event, notified }))
}
