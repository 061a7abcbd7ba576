//! Handlers for `/community/{kind}/{key}/...` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/` | Tracked documents; an unsaved list reads as empty |
//! | `GET`  | `/manage` | Auth; rules, added documents, subscriptions |
//! | `POST` | `/manage` | Auth; body `{"action": ...}`; 302 back |
//! | `POST` | `/track/{name}` | Auth; 302, or `{"success":true}` for XHR |
//! | `POST` | `/untrack/{name}` | Same |
//! | `GET`  | `/subscription` | Auth; the user's subscriptions; 404 without a saved list |
//! | `POST` | `/subscription` | Auth; `subscribe` / `unsubscribe`; 302 back |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use dt_core::{
  document::Document,
  list::{CommunityList, EmailSubscription, NotifyOn},
  person::Person,
  rule::{RuleKind, SearchRule},
  store::CommunityStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Authenticated, MaybeAuthenticated},
  documents::document_named,
  error::ApiError,
  target::{ListKind, Target},
};

/// `302 Found` to a site-relative location.
pub(crate) fn redirect(location: String) -> Response {
  (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn is_xhr(headers: &HeaderMap) -> bool {
  headers
    .get("x-requested-with")
    .is_some_and(|v| v.as_bytes() == b"XMLHttpRequest")
}

// ─── View ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ListView {
  pub title:     String,
  /// `None` while the owner has never saved the list.
  pub list:      Option<CommunityList>,
  pub documents: Vec<Document>,
}

/// `GET /community/{kind}/{key}/`
pub async fn view<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(user): MaybeAuthenticated,
  Path((kind, key)): Path<(ListKind, String)>,
) -> Result<Json<ListView>, ApiError> {
  let store = state.store.as_ref();
  let target = Target::resolve(store, kind, &key, user.map(|u| u.person_id)).await?;

  let documents = match &target.list {
    Some(list) => store.docs_tracked_by_list(list.list_id).await.map_err(ApiError::store)?,
    None => Vec::new(),
  };
  Ok(Json(ListView { title: target.title, list: target.list, documents }))
}

// ─── Manage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RuleView {
  #[serde(flatten)]
  pub rule:    SearchRule,
  /// Number of documents the rule currently matches.
  pub matches: usize,
}

#[derive(Debug, Serialize)]
pub struct ManageView {
  pub title:         String,
  pub list:          Option<CommunityList>,
  pub rules:         Vec<RuleView>,
  pub added:         Vec<Document>,
  pub subscriptions: Vec<EmailSubscription>,
}

/// `GET /community/{kind}/{key}/manage`
pub async fn manage<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((kind, key)): Path<(ListKind, String)>,
) -> Result<Json<ManageView>, ApiError> {
  let store = state.store.as_ref();
  let target = Target::resolve(store, kind, &key, Some(user.person_id)).await?;
  target.require_manager(store, &user).await?;

  let Some(list) = &target.list else {
    return Ok(Json(ManageView {
      title:         target.title,
      list:          None,
      rules:         Vec::new(),
      added:         Vec::new(),
      subscriptions: Vec::new(),
    }));
  };

  let mut rules = Vec::new();
  for rule in store.list_rules(list.list_id).await.map_err(ApiError::store)? {
    let matches = store
      .docs_matching_rule(rule.rule_id)
      .await
      .map_err(ApiError::store)?
      .len();
    rules.push(RuleView { rule, matches });
  }
  let added = store.added_documents(list.list_id).await.map_err(ApiError::store)?;
  let subscriptions = store
    .list_subscriptions(list.list_id)
    .await
    .map_err(ApiError::store)?;

  Ok(Json(ManageView {
    title: target.title.clone(),
    list: target.list.clone(),
    rules,
    added,
    subscriptions,
  }))
}

/// Body of `POST /community/{kind}/{key}/manage`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ManageAction {
  AddDocuments { documents: Vec<String> },
  RemoveDocument { document: String },
  AddRule { rule: RuleKind },
  RemoveRule { rule_id: Uuid },
}

/// Reject rules pointing at groups or people that do not exist.
async fn check_rule_references<S: CommunityStore>(
  store: &S,
  kind: &RuleKind,
) -> Result<(), ApiError> {
  if let Some(group_id) = kind.group_id() {
    if store.get_group(group_id).await.map_err(ApiError::store)?.is_none() {
      return Err(ApiError::BadRequest(format!("unknown group {group_id}")));
    }
  }
  if let Some(person_id) = kind.person_id() {
    if store.get_person(person_id).await.map_err(ApiError::store)?.is_none() {
      return Err(ApiError::BadRequest(format!("unknown person {person_id}")));
    }
  }
  Ok(())
}

/// `POST /community/{kind}/{key}/manage`
pub async fn manage_action<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((kind, key)): Path<(ListKind, String)>,
  Json(action): Json<ManageAction>,
) -> Result<Response, ApiError> {
  let store = state.store.as_ref();
  let mut target = Target::resolve(store, kind, &key, Some(user.person_id)).await?;
  target.require_manager(store, &user).await?;

  match action {
    ManageAction::AddDocuments { documents } => {
      let mut docs = Vec::with_capacity(documents.len());
      for name in &documents {
        docs.push(document_named(store, name).await?);
      }
      let list = target.ensure_saved(store).await?;
      for doc in docs {
        store
          .add_document_to_list(list.list_id, doc.doc_id)
          .await
          .map_err(ApiError::store)?;
      }
      tracing::info!(list = %list.list_id, count = documents.len(), "added documents");
    }
    ManageAction::RemoveDocument { document } => {
      let doc = document_named(store, &document).await?;
      if let Some(list) = &target.list {
        store
          .remove_document_from_list(list.list_id, doc.doc_id)
          .await
          .map_err(ApiError::store)?;
      }
    }
    ManageAction::AddRule { rule } => {
      check_rule_references(store, &rule).await?;
      let list = target.ensure_saved(store).await?;
      let rule = store.add_rule(list.list_id, rule).await.map_err(ApiError::store)?;
      tracing::info!(
        list = %list.list_id,
        rule = %rule.rule_id,
        rule_type = rule.kind.rule_type(),
        "added rule"
      );
    }
    ManageAction::RemoveRule { rule_id } => {
      let list = target.saved()?;
      if !store.remove_rule(list.list_id, rule_id).await.map_err(ApiError::store)? {
        return Err(ApiError::NotFound(format!("rule {rule_id} not found")));
      }
    }
  }

  Ok(redirect(target.url("manage")))
}

// ─── Track / untrack ──────────────────────────────────────────────────────────

/// `POST /community/{kind}/{key}/track/{name}`
pub async fn track<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((kind, key, name)): Path<(ListKind, String, String)>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let store = state.store.as_ref();
  let doc = document_named(store, &name).await?;
  let mut target = Target::resolve(store, kind, &key, Some(user.person_id)).await?;
  target.require_manager(store, &user).await?;

  let list = target.ensure_saved(store).await?;
  store
    .add_document_to_list(list.list_id, doc.doc_id)
    .await
    .map_err(ApiError::store)?;
  tracing::debug!(list = %list.list_id, doc = %doc.name, "tracked document");

  Ok(track_response(&headers, &target))
}

/// `POST /community/{kind}/{key}/untrack/{name}`
pub async fn untrack<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((kind, key, name)): Path<(ListKind, String, String)>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let store = state.store.as_ref();
  let doc = document_named(store, &name).await?;
  let target = Target::resolve(store, kind, &key, Some(user.person_id)).await?;
  target.require_manager(store, &user).await?;

  if let Some(list) = &target.list {
    let removed = store
      .remove_document_from_list(list.list_id, doc.doc_id)
      .await
      .map_err(ApiError::store)?;
    tracing::debug!(list = %list.list_id, doc = %doc.name, removed, "untracked document");
  }

  Ok(track_response(&headers, &target))
}

fn track_response(headers: &HeaderMap, target: &Target) -> Response {
  if is_xhr(headers) {
    Json(json!({ "success": true })).into_response()
  } else {
    redirect(target.url(""))
  }
}

// ─── Subscription ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
  pub title:         String,
  pub list_id:       Uuid,
  /// Addresses the user may subscribe.
  pub emails:        Vec<String>,
  /// The user's own subscriptions to the list.
  pub subscriptions: Vec<EmailSubscription>,
}

/// Body of `POST /community/{kind}/{key}/subscription`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubscriptionAction {
  Subscribe { email: String, notify_on: NotifyOn },
  Unsubscribe { subscription_id: Uuid },
}

async fn user_emails<S: CommunityStore>(store: &S, user: &Person) -> Result<Vec<String>, ApiError> {
  Ok(
    store
      .person_emails(user.person_id)
      .await
      .map_err(ApiError::store)?
      .into_iter()
      .filter(|e| e.active)
      .map(|e| e.address)
      .collect(),
  )
}

/// `GET /community/{kind}/{key}/subscription`
pub async fn subscription<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((kind, key)): Path<(ListKind, String)>,
) -> Result<Json<SubscriptionView>, ApiError> {
  let store = state.store.as_ref();
  let target = Target::resolve(store, kind, &key, Some(user.person_id)).await?;
  let list = target.saved()?;

  let emails = user_emails(store, &user).await?;
  let subscriptions = store
    .list_subscriptions(list.list_id)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .filter(|s| emails.contains(&s.email))
    .collect();

  Ok(Json(SubscriptionView {
    title: target.title.clone(),
    list_id: list.list_id,
    emails,
    subscriptions,
  }))
}

/// `POST /community/{kind}/{key}/subscription`
pub async fn subscription_action<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((kind, key)): Path<(ListKind, String)>,
  Json(action): Json<SubscriptionAction>,
) -> Result<Response, ApiError> {
  let store = state.store.as_ref();
  let target = Target::resolve(store, kind, &key, Some(user.person_id)).await?;
  let list = target.saved()?;
  let emails = user_emails(store, &user).await?;

  match action {
    SubscriptionAction::Subscribe { email, notify_on } => {
      if !emails.contains(&email) {
        return Err(ApiError::BadRequest(format!("{email} is not one of your addresses")));
      }
      let sub = store
        .add_subscription(list.list_id, email, notify_on)
        .await
        .map_err(ApiError::store)?;
      tracing::info!(
        list = %list.list_id,
        email = %sub.email,
        notify_on = sub.notify_on.as_str(),
        "subscribed"
      );
    }
    SubscriptionAction::Unsubscribe { subscription_id } => {
      let owned = store
        .list_subscriptions(list.list_id)
        .await
        .map_err(ApiError::store)?
        .into_iter()
        .any(|s| s.subscription_id == subscription_id && emails.contains(&s.email));
      if !owned {
        return Err(ApiError::NotFound(format!("subscription {subscription_id} not found")));
      }
      store
        .remove_subscription(list.list_id, subscription_id)
        .await
        .map_err(ApiError::store)?;
    }
  }

  Ok(redirect(target.url("subscription")))
}

#[cfg(test)]
mod tests {
  use axum::{
    body::{Body, to_bytes},
    http::{Request, header},
  };
  use dt_core::{
    document::{NewDocument, State as DocState},
    group::NewGroup,
    list::ListOwner,
    person::NewPerson,
    rule::RuleKind,
  };
  use serde_json::Value;
  use tower::ServiceExt as _;

  use super::*;
  use crate::{
    router,
    testing::{basic, state_with_user},
  };

  async fn body_json(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
      req = req.header(header::AUTHORIZATION, auth);
    }
    req.body(Body::from(body.to_string())).unwrap()
  }

  #[tokio::test]
  async fn ambiguous_name_lists_every_candidate() {
    let (state, _) = state_with_user("plain", "secret").await;
    state
      .store
      .add_person(NewPerson::new("John Q. Public").with_email("jqp1@example.com"))
      .await
      .unwrap();
    state
      .store
      .add_person(NewPerson::new("John Q. Public").with_email("jqp2@example.com"))
      .await
      .unwrap();

    let res = router(state)
      .oneshot(
        Request::get("/community/personal/John%20Q.%20Public/")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::MULTIPLE_CHOICES);

    let body = body_json(res).await;
    let emails: Vec<&str> = body["candidates"]
      .as_array()
      .unwrap()
      .iter()
      .flat_map(|c| c["emails"].as_array().unwrap())
      .filter_map(Value::as_str)
      .collect();
    assert_eq!(emails.len(), 2);
    assert!(emails.contains(&"jqp1@example.com"));
    assert!(emails.contains(&"jqp2@example.com"));
  }

  #[tokio::test]
  async fn unknown_owner_is_not_found() {
    let (state, _) = state_with_user("plain", "secret").await;
    let app = router(state);
    for uri in ["/community/personal/nobody@example.com/", "/community/group/nosuchwg/"] {
      let res = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
      assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
    }
  }

  #[tokio::test]
  async fn unsaved_list_reads_as_empty() {
    let (state, _) = state_with_user("plain", "secret").await;
    let res = router(state)
      .oneshot(
        Request::get("/community/personal/plain@example.com/")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert!(body["list"].is_null());
    assert_eq!(body["documents"], json!([]));
    assert_eq!(body["title"], "Personal I-D list of Plain Man");
  }

  #[tokio::test]
  async fn track_then_untrack_with_redirects() {
    let (state, person) = state_with_user("plain", "secret").await;
    state
      .store
      .add_document(NewDocument::draft("draft-ietf-mars-test"))
      .await
      .unwrap();
    let app = router(state.clone());
    let auth = basic("plain", "secret");

    let res = app
      .clone()
      .oneshot(post_json(
        "/community/personal/plain@example.com/track/draft-ietf-mars-test",
        Some(&auth),
        json!({}),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
      res.headers()[header::LOCATION],
      "/community/personal/plain%40example.com/"
    );

    let list = state
      .store
      .get_list(ListOwner::Person(person.person_id))
      .await
      .unwrap()
      .expect("tracking saves the list");
    let tracked = state.store.docs_tracked_by_list(list.list_id).await.unwrap();
    assert_eq!(tracked.len(), 1);

    let res = app
      .oneshot(post_json(
        "/community/personal/plain@example.com/untrack/draft-ietf-mars-test",
        Some(&auth),
        json!({}),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert!(state.store.docs_tracked_by_list(list.list_id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn track_then_untrack_as_xhr() {
    let (state, person) = state_with_user("plain", "secret").await;
    state
      .store
      .add_document(NewDocument::draft("draft-ietf-mars-test"))
      .await
      .unwrap();
    let app = router(state.clone());

    for op in ["track", "untrack"] {
      let req = Request::post(format!(
        "/community/personal/plain@example.com/{op}/draft-ietf-mars-test"
      ))
      .header(header::AUTHORIZATION, basic("plain", "secret"))
      .header("X-Requested-With", "XMLHttpRequest")
      .body(Body::empty())
      .unwrap();
      let res = app.clone().oneshot(req).await.unwrap();
      assert_eq!(res.status(), StatusCode::OK, "{op}");
      assert_eq!(body_json(res).await, json!({ "success": true }));
    }

    let list = state
      .store
      .get_list(ListOwner::Person(person.person_id))
      .await
      .unwrap()
      .unwrap();
    assert!(state.store.docs_tracked_by_list(list.list_id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn tracking_unknown_document_is_not_found() {
    let (state, _) = state_with_user("plain", "secret").await;
    let res = router(state)
      .oneshot(post_json(
        "/community/personal/plain@example.com/track/draft-nope",
        Some(&basic("plain", "secret")),
        json!({}),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn managing_requires_login_and_ownership() {
    let (state, _) = state_with_user("plain", "secret").await;
    state
      .store
      .add_person(NewPerson::new("Other Person").with_email("other@example.com"))
      .await
      .unwrap();
    state.store.add_group(NewGroup::new("mars", "wg")).await.unwrap();
    let app = router(state);

    let res = app
      .clone()
      .oneshot(
        Request::get("/community/personal/plain@example.com/manage")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

    for uri in ["/community/personal/other@example.com/manage", "/community/group/mars/manage"] {
      let res = app
        .clone()
        .oneshot(
          Request::get(uri)
            .header(header::AUTHORIZATION, basic("plain", "secret"))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
      assert_eq!(res.status(), StatusCode::FORBIDDEN, "{uri}");
    }
  }

  #[tokio::test]
  async fn group_chair_manages_group_list() {
    let (state, person) = state_with_user("plain", "secret").await;
    let group = state.store.add_group(NewGroup::new("mars", "wg")).await.unwrap();
    state
      .store
      .add_role(group.group_id, person.person_id, "chair".into())
      .await
      .unwrap();
    let doc = state
      .store
      .add_document(NewDocument {
        group_id: Some(group.group_id),
        states: vec![DocState::draft("active")],
        ..NewDocument::draft("draft-ietf-mars-test")
      })
      .await
      .unwrap();
    let app = router(state.clone());
    let auth = basic("plain", "secret");

    let rule = RuleKind::Group { group_id: group.group_id, state: "active".into() };
    let res = app
      .clone()
      .oneshot(post_json(
        "/community/group/mars/manage",
        Some(&auth),
        json!({ "action": "add_rule", "rule": rule }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[header::LOCATION], "/community/group/mars/manage");

    let res = app
      .oneshot(
        Request::get("/community/group/mars/manage")
          .header(header::AUTHORIZATION, auth)
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["title"], "I-D list for mars");
    assert_eq!(body["rules"][0]["rule_type"], "group");
    assert_eq!(body["rules"][0]["matches"], 1);

    let lists = state.store.lists_tracking_doc(doc.doc_id).await.unwrap();
    assert_eq!(lists.len(), 1);
  }

  #[tokio::test]
  async fn manage_actions_add_and_remove() {
    let (state, person) = state_with_user("plain", "secret").await;
    for name in ["draft-ietf-mars-one", "draft-ietf-mars-two"] {
      state.store.add_document(NewDocument::draft(name)).await.unwrap();
    }
    let app = router(state.clone());
    let auth = basic("plain", "secret");
    let uri = "/community/personal/plain@example.com/manage";

    let res = app
      .clone()
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({
          "action": "add_documents",
          "documents": ["draft-ietf-mars-one", "draft-ietf-mars-two"],
        }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);

    let res = app
      .clone()
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({ "action": "remove_document", "document": "draft-ietf-mars-one" }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);

    let list = state
      .store
      .get_list(ListOwner::Person(person.person_id))
      .await
      .unwrap()
      .unwrap();
    let added: Vec<_> = state
      .store
      .added_documents(list.list_id)
      .await
      .unwrap()
      .into_iter()
      .map(|d| d.name)
      .collect();
    assert_eq!(added, ["draft-ietf-mars-two"]);

    let res = app
      .clone()
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({
          "action": "add_rule",
          "rule": { "rule_type": "name_contains", "text": "(", "state": "active" },
        }),
      ))
      .await
      .unwrap();
    assert!(res.status().is_client_error(), "invalid pattern accepted");

    let res = app
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({ "action": "remove_rule", "rule_id": Uuid::new_v4() }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn rules_must_reference_existing_people() {
    let (state, _) = state_with_user("plain", "secret").await;
    let rule = RuleKind::Author { person_id: Uuid::new_v4(), state: "active".into() };
    let res = router(state)
      .oneshot(post_json(
        "/community/personal/plain@example.com/manage",
        Some(&basic("plain", "secret")),
        json!({ "action": "add_rule", "rule": rule }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn subscription_needs_a_saved_list() {
    let (state, _) = state_with_user("plain", "secret").await;
    let res = router(state)
      .oneshot(
        Request::get("/community/personal/plain@example.com/subscription")
          .header(header::AUTHORIZATION, basic("plain", "secret"))
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn subscribe_and_unsubscribe_own_address() {
    let (state, person) = state_with_user("plain", "secret").await;
    let list = state
      .store
      .create_list(ListOwner::Person(person.person_id))
      .await
      .unwrap();
    let app = router(state.clone());
    let auth = basic("plain", "secret");
    let uri = "/community/personal/plain@example.com/subscription";

    let res = app
      .clone()
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({ "action": "subscribe", "email": "someone@else.org", "notify_on": "all" }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
      .clone()
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({ "action": "subscribe", "email": "plain@example.com", "notify_on": "significant" }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);

    let subs = state.store.list_subscriptions(list.list_id).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].notify_on, NotifyOn::Significant);

    let res = app
      .clone()
      .oneshot(
        Request::get(uri)
          .header(header::AUTHORIZATION, auth.clone())
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["emails"], json!(["plain@example.com"]));
    assert_eq!(body["subscriptions"].as_array().unwrap().len(), 1);

    let res = app
      .oneshot(post_json(
        uri,
        Some(&auth),
        json!({ "action": "unsubscribe", "subscription_id": subs[0].subscription_id }),
      ))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert!(state.store.list_subscriptions(list.list_id).await.unwrap().is_empty());
  }
}
