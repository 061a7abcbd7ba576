//! Strong ETags for generated exports.
//!
//! The tag is the SHA-256 of the response body, so identical content always
//! yields the identical tag.

use axum::{
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

/// Quoted hex SHA-256 of `body`.
pub fn compute_etag(body: &[u8]) -> String {
  format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

/// Whether the request's `If-None-Match` already names `etag`.
pub fn not_modified(headers: &HeaderMap, etag: &str) -> bool {
  headers
    .get_all(header::IF_NONE_MATCH)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(','))
    .map(str::trim)
    .any(|tag| tag == "*" || tag == etag || tag.strip_prefix("W/") == Some(etag))
}

/// Respond with `body` and its ETag, or with 304 if the client's copy is
/// current.
pub fn respond(headers: &HeaderMap, content_type: &'static str, body: Vec<u8>) -> Response {
  let etag = compute_etag(&body);
  let etag_value = HeaderValue::from_str(&etag).ok();

  let mut res = if not_modified(headers, &etag) {
    StatusCode::NOT_MODIFIED.into_response()
  } else {
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
  };
  if let Some(value) = etag_value {
    res.headers_mut().insert(header::ETAG, value);
  }
  res
}
