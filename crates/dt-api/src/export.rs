//! CSV and Atom exports of a community list.
//!
//! Both are generated in full on every request and served with a strong
//! ETag over the body (see [`crate::etag`]).

use std::{
  collections::HashMap,
  io::{self, Cursor},
};

use axum::{
  extract::{Path, Query, State},
  http::{HeaderMap, HeaderValue, header},
  response::Response,
};
use chrono::{DateTime, Duration, Utc};
use dt_core::{
  document::{DocEvent, Document, StateType},
  notify::is_significant_event,
  store::CommunityStore,
};
use quick_xml::{
  Writer,
  events::{BytesDecl, BytesText, Event},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  auth::MaybeAuthenticated,
  error::ApiError,
  etag,
  target::{ListKind, Target},
};

const CSV_HEADER: [&str; 7] = ["Name", "Title", "Last change", "State", "AD", "Shepherd", "Group"];

async fn tracked_documents<S: CommunityStore>(
  store: &S,
  target: &Target,
) -> Result<Vec<Document>, ApiError> {
  match &target.list {
    Some(list) => store.docs_tracked_by_list(list.list_id).await.map_err(ApiError::store),
    None => Ok(Vec::new()),
  }
}

// ─── CSV ──────────────────────────────────────────────────────────────────────

/// The state shown for a document: its IESG state while it has one,
/// otherwise its draft state.
fn display_state(doc: &Document) -> &str {
  doc
    .state(&StateType::DraftIesg)
    .or_else(|| doc.state(&StateType::Draft))
    .map_or("", |s| s.slug.as_str())
}

/// Person names and group acronyms referenced by `docs`, fetched once each.
struct Names {
  people: HashMap<Uuid, String>,
  groups: HashMap<Uuid, String>,
}

impl Names {
  async fn load<S: CommunityStore>(store: &S, docs: &[Document]) -> Result<Self, ApiError> {
    let mut names = Self { people: HashMap::new(), groups: HashMap::new() };
    for doc in docs {
      if let Some(ad) = doc.ad_id.filter(|id| !names.people.contains_key(id)) {
        if let Some(p) = store.get_person(ad).await.map_err(ApiError::store)? {
          names.people.insert(ad, p.name);
        }
      }
      if let Some(g) = doc.group_id.filter(|id| !names.groups.contains_key(id)) {
        if let Some(group) = store.get_group(g).await.map_err(ApiError::store)? {
          names.groups.insert(g, group.acronym);
        }
      }
    }
    Ok(names)
  }

  fn person(&self, id: Option<Uuid>) -> &str {
    id.and_then(|id| self.people.get(&id)).map_or("", String::as_str)
  }

  fn group(&self, id: Option<Uuid>) -> &str {
    id.and_then(|id| self.groups.get(&id)).map_or("", String::as_str)
  }
}

fn write_csv(docs: &[Document], names: &Names) -> Result<Vec<u8>, csv::Error> {
  let mut writer = csv::Writer::from_writer(Vec::new());
  writer.write_record(CSV_HEADER)?;
  for doc in docs {
    let last_change = doc.time.format("%Y-%m-%d").to_string();
    writer.write_record([
      doc.name.as_str(),
      doc.title.as_str(),
      last_change.as_str(),
      display_state(doc),
      names.person(doc.ad_id),
      doc.shepherd.as_deref().unwrap_or(""),
      names.group(doc.group_id),
    ])?;
  }
  writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// `GET /community/{kind}/{key}/csv`
pub async fn csv<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(user): MaybeAuthenticated,
  Path((kind, key)): Path<(ListKind, String)>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let store = state.store.as_ref();
  let target = Target::resolve(store, kind, &key, user.map(|u| u.person_id)).await?;
  let docs = tracked_documents(store, &target).await?;
  let names = Names::load(store, &docs).await?;
  let body = write_csv(&docs, &names).map_err(ApiError::store)?;

  let mut res = etag::respond(&headers, "text/csv; charset=utf-8", body);
  let filename: String = key
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
    .collect();
  if let Ok(value) =
    HeaderValue::from_str(&format!("attachment; filename=\"ietf-community-list-{filename}.csv\""))
  {
    res.headers_mut().insert(header::CONTENT_DISPOSITION, value);
  }
  Ok(res)
}

// ─── Atom feed ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
  /// Any non-empty value restricts the feed to significant changes.
  #[serde(default)]
  pub significant: Option<String>,
}

impl FeedParams {
  fn significant_only(&self) -> bool {
    self.significant.as_deref().is_some_and(|v| !v.is_empty() && v != "0")
  }
}

/// Everything a feed body is rendered from.
struct Feed<'a> {
  title:   String,
  self_id: String,
  link:    String,
  updated: DateTime<Utc>,
  entries: Vec<(&'a Document, DocEvent, String)>,
}

fn write_atom(feed: &Feed<'_>, base_url: &str) -> io::Result<Vec<u8>> {
  let mut writer = Writer::new(Cursor::new(Vec::new()));
  writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

  writer
    .create_element("feed")
    .with_attribute(("xmlns", "http://www.w3.org/2005/Atom"))
    .write_inner_content(|w| {
      w.create_element("title").write_text_content(BytesText::new(&feed.title))?;
      w.create_element("id").write_text_content(BytesText::new(&feed.self_id))?;
      w.create_element("link").with_attribute(("href", feed.link.as_str())).write_empty()?;
      w.create_element("updated")
        .write_text_content(BytesText::new(&feed.updated.to_rfc3339()))?;

      for (doc, event, author) in &feed.entries {
        let doc_url = format!("{}/doc/{}/", base_url.trim_end_matches('/'), doc.name);
        w.create_element("entry").write_inner_content(|w| {
          w.create_element("title")
            .write_text_content(BytesText::new(&format!("{}: {}", doc.name, event.desc)))?;
          w.create_element("id")
            .write_text_content(BytesText::new(&format!("urn:uuid:{}", event.event_id)))?;
          w.create_element("link").with_attribute(("href", doc_url.as_str())).write_empty()?;
          w.create_element("updated")
            .write_text_content(BytesText::new(&event.time.to_rfc3339()))?;
          w.create_element("author").write_inner_content(|w| {
            w.create_element("name").write_text_content(BytesText::new(author))?;
            Ok(())
          })?;
          w.create_element("summary").write_text_content(BytesText::new(&event.desc))?;
          Ok(())
        })?;
      }
      Ok(())
    })?;

  Ok(writer.into_inner().into_inner())
}

/// `GET /community/{kind}/{key}/feed[?significant=1]`
pub async fn feed<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(user): MaybeAuthenticated,
  Path((kind, key)): Path<(ListKind, String)>,
  Query(params): Query<FeedParams>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let store = state.store.as_ref();
  let config = state.config.as_ref();
  let target = Target::resolve(store, kind, &key, user.map(|u| u.person_id)).await?;
  let docs = tracked_documents(store, &target).await?;

  let since = Utc::now() - Duration::days(config.feed_days);
  let by_id: HashMap<Uuid, &Document> = docs.iter().map(|d| (d.doc_id, d)).collect();
  let significant_only = params.significant_only();
  let events: Vec<DocEvent> = store
    .events_for_docs(by_id.keys().copied().collect(), since)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .filter(|e| !significant_only || is_significant_event(e))
    .collect();

  let mut authors: HashMap<Uuid, String> = HashMap::new();
  let mut entries = Vec::with_capacity(events.len());
  for event in events {
    let Some(doc) = by_id.get(&event.doc_id).copied() else { continue };
    if !authors.contains_key(&event.by) {
      let name = store
        .get_person(event.by)
        .await
        .map_err(ApiError::store)?
        .map_or_else(String::new, |p| p.name);
      authors.insert(event.by, name);
    }
    let author = authors.get(&event.by).cloned().unwrap_or_default();
    entries.push((doc, event, author));
  }

  let list_url = format!("{}{}", config.base_url.trim_end_matches('/'), target.url(""));
  let updated = entries
    .first()
    .map(|(_, e, _)| e.time)
    .or(target.list.as_ref().map(|l| l.created_at))
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
  let feed = Feed {
    title: format!("Changes for {}", target.title),
    self_id: format!("{list_url}feed"),
    link: list_url,
    updated,
    entries,
  };
  tracing::debug!(
    list = %target.key,
    entries = feed.entries.len(),
    significant_only,
    "rendered feed"
  );

  let body = write_atom(&feed, &config.base_url).map_err(ApiError::store)?;
  Ok(etag::respond(&headers, "application/atom+xml", body))
}

#[cfg(test)]
mod tests {
  use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
  };
  use dt_core::{
    document::{NewDocument, State as DocState},
    group::NewGroup,
    list::ListOwner,
    person::NewPerson,
  };
  use tower::ServiceExt as _;

  use super::*;
  use crate::{router, testing::state_with_user};

  /// Plain Man's list tracks one active mars draft with an AD, a shepherd
  /// and a state change from today.
  async fn tracked_app() -> axum::Router {
    let (state, person) = state_with_user("plain", "secret").await;
    let store = state.store.as_ref();
    let ad = store
      .add_person(NewPerson::new("Area Director").with_email("ad@example.org"))
      .await
      .unwrap();
    let group = store.add_group(NewGroup::new("mars", "wg")).await.unwrap();
    let doc = store
      .add_document(NewDocument {
        title: "Routing on Mars, \"quoted\"".into(),
        group_id: Some(group.group_id),
        ad_id: Some(ad.person_id),
        shepherd: Some("plain@example.com".into()),
        states: vec![DocState::draft("active")],
        ..NewDocument::draft("draft-ietf-mars-routing")
      })
      .await
      .unwrap();
    let list = store.create_list(ListOwner::Person(person.person_id)).await.unwrap();
    store.add_document_to_list(list.list_id, doc.doc_id).await.unwrap();
    store
      .add_state_change_event(doc.doc_id, person.person_id, DocState::iesg("ad-eval"))
      .await
      .unwrap();
    router(state)
  }

  async fn get(app: &axum::Router, uri: &str, if_none_match: Option<&str>) -> Response {
    let mut req = Request::get(uri);
    if let Some(tag) = if_none_match {
      req = req.header(header::IF_NONE_MATCH, tag);
    }
    app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
  }

  async fn text(res: Response) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
  }

  #[tokio::test]
  async fn csv_lists_tracked_documents() {
    let app = tracked_app().await;
    let res = get(&app, "/community/personal/plain@example.com/csv", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    assert!(res.headers().contains_key(header::ETAG));

    let body = text(res).await;
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), CSV_HEADER);
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], "draft-ietf-mars-routing");
    assert_eq!(&rows[0][1], "Routing on Mars, \"quoted\"");
    assert_eq!(&rows[0][3], "ad-eval");
    assert_eq!(&rows[0][4], "Area Director");
    assert_eq!(&rows[0][5], "plain@example.com");
    assert_eq!(&rows[0][6], "mars");
  }

  #[tokio::test]
  async fn csv_honours_if_none_match() {
    let app = tracked_app().await;
    let uri = "/community/personal/plain@example.com/csv";
    let first = get(&app, uri, None).await;
    let tag = first.headers()[header::ETAG].to_str().unwrap().to_owned();

    let again = get(&app, uri, Some(&tag)).await;
    assert_eq!(again.status(), StatusCode::NOT_MODIFIED);
    assert!(text(again).await.is_empty());

    let stale = get(&app, uri, Some("\"stale\"")).await;
    assert_eq!(stale.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn feed_has_an_entry_per_recent_event() {
    let app = tracked_app().await;
    let res = get(&app, "/community/personal/plain@example.com/feed", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/atom+xml");

    let body = text(res).await;
    assert!(body.starts_with("<?xml"));
    assert!(body.contains("<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
    assert!(body.contains("<title>Changes for Personal I-D list of Plain Man</title>"));
    assert_eq!(body.matches("<entry>").count(), 1);
    assert!(body.contains("draft-ietf-mars-routing: "));
    assert!(body.contains("<name>Plain Man</name>"));
  }

  #[tokio::test]
  async fn significant_feed_drops_minor_changes() {
    let app = tracked_app().await;
    let uri = "/community/personal/plain@example.com/feed?significant=1";
    let body = text(get(&app, uri, None).await).await;
    assert!(body.contains("<feed"));
    assert!(!body.contains("<entry>"));
  }

  #[tokio::test]
  async fn exports_of_an_unsaved_list_are_empty() {
    let (state, _) = state_with_user("plain", "secret").await;
    let app = router(state);

    let body = text(get(&app, "/community/personal/plain@example.com/csv", None).await).await;
    assert_eq!(body.lines().count(), 1);

    let body = text(get(&app, "/community/personal/plain@example.com/feed", None).await).await;
    assert!(!body.contains("<entry>"));
    assert!(body.contains("<updated>1970-01-01T00:00:00+00:00</updated>"));
  }

  #[test]
  fn significant_flag_parsing() {
    let flag =
      |v: Option<&str>| FeedParams { significant: v.map(str::to_owned) }.significant_only();
    assert!(!flag(None));
    assert!(!flag(Some("")));
    assert!(!flag(Some("0")));
    assert!(flag(Some("1")));
    assert!(flag(Some("true")));
  }
}
