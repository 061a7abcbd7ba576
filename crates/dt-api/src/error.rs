//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One person an ambiguous identifier could refer to.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
  pub name:     String,
  pub username: Option<String>,
  pub emails:   Vec<String>,
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden")]
  Forbidden,

  #[error("{0:?} matches more than one person")]
  Ambiguous(String, Vec<Candidate>),

  #[error("proceedings error: {0}")]
  Proceedings(#[from] dt_proceedings::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<dt_core::Error> for ApiError {
  fn from(e: dt_core::Error) -> Self {
    match e {
      dt_core::Error::InvalidPattern { .. }
      | dt_core::Error::UnknownRuleType(_)
      | dt_core::Error::IncompleteRule { .. }
      | dt_core::Error::UnknownNotifyOn(_) => Self::BadRequest(e.to_string()),
      other => Self::store(other),
    }
  }
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    use dt_proceedings::Error as Fs;
    match self {
      ApiError::NotFound(_) | ApiError::Proceedings(Fs::NoSuchMaterial(_)) => {
        StatusCode::NOT_FOUND
      }
      ApiError::BadRequest(_)
      | ApiError::Proceedings(
        Fs::InvalidFilename(_)
        | Fs::UnsafeEntry(_)
        | Fs::UnknownMaterial(_)
        | Fs::NotSessionMaterial(_)
        | Fs::Zip(_),
      ) => StatusCode::BAD_REQUEST,
      ApiError::Proceedings(Fs::NumberingExhausted(_)) => StatusCode::CONFLICT,
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden => StatusCode::FORBIDDEN,
      ApiError::Ambiguous(..) => StatusCode::MULTIPLE_CHOICES,
      ApiError::Proceedings(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = self.to_string();
    if status.is_server_error() {
      tracing::error!(error = %message, "request failed");
    }

    let body = match &self {
      ApiError::Ambiguous(_, candidates) => json!({ "error": message, "candidates": candidates }),
      _ => json!({ "error": message }),
    };
    let mut res = (status, Json(body)).into_response();
    if let ApiError::Unauthorized = self {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"datatracker\""),
      );
    }
    res
  }
}
