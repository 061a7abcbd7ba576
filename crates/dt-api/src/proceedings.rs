//! Meeting materials under the proceedings root.
//!
//! `PUT /proceedings/{meeting}/{material}/{filename}` stores a file under the
//! name given. The `/proceedings/{meeting}/groups/{acronym}` routes manage
//! one group's session instead: agenda and minutes get their canonical names,
//! slides are numbered and ordered, and materials can be reordered and
//! deleted. Request bodies are the raw file. Zip uploads are unpacked next to
//! the stored archive. Filesystem work runs on the blocking pool, one request
//! at a time.

use std::path::Path as FsPath;

use axum::{
  Json,
  body::Bytes,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{Datelike as _, NaiveDate};
use dt_core::store::CommunityStore;
use dt_proceedings::{Direction, MaterialType, MeetingDir, SessionMaterials, SlideDeck};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::Authenticated, error::ApiError};

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Meeting numbers are plain names: `119`, `interim-2024-mars-1`.
fn valid_meeting(meeting: &str) -> bool {
  !meeting.is_empty()
    && !meeting.starts_with('.')
    && meeting
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn relative(path: &FsPath, base: &FsPath) -> String {
  path.strip_prefix(base).unwrap_or(path).display().to_string()
}

/// Run filesystem work on the blocking pool while holding the proceedings
/// lock.
async fn blocking<S, T, F>(state: &AppState<S>, f: F) -> Result<T, ApiError>
where
  S: CommunityStore,
  T: Send + 'static,
  F: FnOnce() -> dt_proceedings::Result<T> + Send + 'static,
{
  let _guard = state.proceedings_lock.lock().await;
  Ok(tokio::task::spawn_blocking(f).await.map_err(ApiError::store)??)
}

/// The session of group `acronym` at `meeting`. The group must exist.
async fn session<S: CommunityStore>(
  state: &AppState<S>,
  meeting: &str,
  acronym: &str,
) -> Result<SessionMaterials, ApiError> {
  if !valid_meeting(meeting) {
    return Err(ApiError::BadRequest(format!("invalid meeting number {meeting:?}")));
  }
  state
    .store
    .get_group_by_acronym(acronym)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("group {acronym} not found")))?;
  let dir = MeetingDir::new(&state.config.proceedings_root, meeting);
  Ok(SessionMaterials::new(dir, acronym)?)
}

fn meeting_not_found(meeting: &str) -> ApiError {
  ApiError::NotFound(format!("meeting {meeting} not found"))
}

// ─── Raw upload ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResult {
  pub meeting:   String,
  pub material:  MaterialType,
  /// Paths relative to the meeting directory.
  pub stored:    String,
  pub extracted: Vec<String>,
}

/// `PUT /proceedings/{meeting}/{material}/{filename}`
pub async fn upload<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((meeting, material, filename)): Path<(String, String, String)>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
  if !valid_meeting(&meeting) {
    return Err(ApiError::BadRequest(format!("invalid meeting number {meeting:?}")));
  }
  let material: MaterialType = material.parse()?;
  let dir = MeetingDir::new(&state.config.proceedings_root, meeting.clone());

  let (upload, base) = blocking(&state, move || {
    dir.make_directories()?;
    let upload = dir.handle_upload(material, &filename, &body)?;
    Ok((upload, dir.path().to_path_buf()))
  })
  .await?;

  tracing::info!(
    user = %user.person_id,
    %meeting,
    %material,
    stored = %upload.stored.display(),
    extracted = upload.extracted.len(),
    "proceedings upload"
  );

  Ok((
    StatusCode::CREATED,
    Json(UploadResult {
      meeting,
      material,
      stored: relative(&upload.stored, &base),
      extracted: upload.extracted.iter().map(|p| relative(p, &base)).collect(),
    }),
  ))
}

// ─── Interim meetings ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewInterim {
  pub acronym: String,
  pub date:    NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct InterimCreated {
  pub meeting: String,
}

/// `POST /proceedings/interims`
pub async fn create_interim<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Json(body): Json<NewInterim>,
) -> Result<impl IntoResponse, ApiError> {
  state
    .store
    .get_group_by_acronym(&body.acronym)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("group {} not found", body.acronym)))?;

  let root = state.config.proceedings_root.clone();
  let year = body.date.year();
  let meeting = blocking(&state, move || MeetingDir::create_interim(root, &body.acronym, year))
    .await?;

  tracing::info!(user = %user.person_id, meeting = %meeting.number(), "interim meeting created");
  Ok((StatusCode::CREATED, Json(InterimCreated { meeting: meeting.number().to_owned() })))
}

// ─── Session materials ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionView {
  pub meeting:         String,
  pub acronym:         String,
  pub slides:          Vec<SlideDeck>,
  pub agenda:          Option<String>,
  pub minutes:         Option<String>,
  /// Set once the group's proceedings page has been generated.
  pub proceedings_url: Option<String>,
}

/// `GET /proceedings/{meeting}/groups/{acronym}`
pub async fn session_view<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Path((meeting, acronym)): Path<(String, String)>,
) -> Result<Json<SessionView>, ApiError> {
  let session = session(&state, &meeting, &acronym).await?;
  let media_url = state.config.media_url.clone();

  let view = blocking(&state, move || {
    let dir = session.meeting();
    if !dir.path().is_dir() {
      return Ok(None);
    }
    let proceedings_url = dir
      .proceedings_path(session.acronym())
      .is_file()
      .then(|| dir.proceedings_url(&media_url, session.acronym()));
    Ok(Some(SessionView {
      meeting: dir.number().to_owned(),
      acronym: session.acronym().to_owned(),
      slides: session.slides()?,
      agenda: session.current(MaterialType::Agenda)?,
      minutes: session.current(MaterialType::Minutes)?,
      proceedings_url,
    }))
  })
  .await?;

  view.map(Json).ok_or_else(|| meeting_not_found(&meeting))
}

#[derive(Debug, Deserialize)]
pub struct MaterialParams {
  /// Required for slides.
  #[serde(default)]
  pub title:    Option<String>,
  /// Name of the file as uploaded; only its extension is kept.
  #[serde(default)]
  pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MaterialUpload {
  pub name:      String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order:     Option<u32>,
  /// Paths relative to the meeting directory.
  pub stored:    String,
  pub extracted: Vec<String>,
}

/// `POST /proceedings/{meeting}/groups/{acronym}/{material}`
///
/// Slides become the next numbered deck, last in the running order. Agenda
/// and minutes replace the session's current file.
pub async fn upload_material<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((meeting, acronym, material)): Path<(String, String, String)>,
  Query(params): Query<MaterialParams>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
  let material: MaterialType = material.parse()?;
  let session = session(&state, &meeting, &acronym).await?;
  let ext = params
    .filename
    .as_deref()
    .and_then(|f| FsPath::new(f).extension())
    .map(|e| e.to_string_lossy().into_owned());
  let title = match (material, params.title) {
    (MaterialType::Slides, Some(title)) if !title.trim().is_empty() => title,
    (MaterialType::Slides, _) => {
      return Err(ApiError::BadRequest("slides need a title".into()));
    }
    (_, title) => title.unwrap_or_default(),
  };

  let result = blocking(&state, move || {
    let dir = session.meeting();
    dir.make_directories()?;
    let base = dir.path().to_path_buf();

    let (name, order, upload) = if material == MaterialType::Slides {
      let (deck, upload) = session.add_slides(&title, ext.as_deref(), &body)?;
      (deck.name, Some(deck.order), upload)
    } else {
      let upload = session.replace(material, ext.as_deref(), &body)?;
      let name = upload
        .stored
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      (name, None, upload)
    };

    Ok(MaterialUpload {
      name,
      order,
      stored: relative(&upload.stored, &base),
      extracted: upload.extracted.iter().map(|p| relative(p, &base)).collect(),
    })
  })
  .await?;

  tracing::info!(
    user = %user.person_id,
    %meeting,
    %acronym,
    name = %result.name,
    "session material uploaded"
  );
  Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct MoveParams {
  pub direction: Direction,
}

/// `POST /proceedings/{meeting}/groups/{acronym}/slides/{name}?direction=up`
///
/// Returns the decks in their new order.
pub async fn move_slide<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(_user): Authenticated,
  Path((meeting, acronym, material, name)): Path<(String, String, String, String)>,
  Query(params): Query<MoveParams>,
) -> Result<Json<Vec<SlideDeck>>, ApiError> {
  if material.parse::<MaterialType>()? != MaterialType::Slides {
    return Err(ApiError::BadRequest(format!("only slides have an order, not {material}")));
  }
  let session = session(&state, &meeting, &acronym).await?;
  let decks = blocking(&state, move || session.move_slide(&name, params.direction)).await?;
  Ok(Json(decks))
}

#[derive(Debug, Serialize)]
pub struct Deleted {
  /// Paths relative to the meeting directory.
  pub removed: Vec<String>,
}

/// `DELETE /proceedings/{meeting}/groups/{acronym}/{material}/{name}`
pub async fn delete_material<S: CommunityStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(user): Authenticated,
  Path((meeting, acronym, material, name)): Path<(String, String, String, String)>,
) -> Result<Json<Deleted>, ApiError> {
  let material: MaterialType = material.parse()?;
  let session = session(&state, &meeting, &acronym).await?;

  let removed = blocking(&state, move || {
    let base = session.meeting().path().to_path_buf();
    let removed = session.delete(material, &name)?;
    Ok(removed.iter().map(|p| relative(p, &base)).collect::<Vec<_>>())
  })
  .await?;

  tracing::info!(user = %user.person_id, %meeting, %acronym, %material, "session material deleted");
  Ok(Json(Deleted { removed }))
}
