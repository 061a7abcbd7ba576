//! HTTP Basic-auth extractors backed by the credentials in the store.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use dt_core::{person::Person, store::CommunityStore};
use rand_core::OsRng;

use crate::{AppState, error::ApiError};

/// The authenticated person. Rejects the request with 401 when credentials
/// are missing or wrong.
pub struct Authenticated(pub Person);

/// The authenticated person if the request carries valid credentials.
/// Never rejects.
pub struct MaybeAuthenticated(pub Option<Person>);

/// Produce an argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Split a `Basic` authorization header into username and password.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let encoded = value.strip_prefix("Basic ")?;
  let decoded = B64.decode(encoded).ok()?;
  let creds = String::from_utf8(decoded).ok()?;
  let (username, password) = creds.split_once(':')?;
  Some((username.to_owned(), password.to_owned()))
}

/// Check the request's Basic credentials against the store.
pub async fn verify_auth<S: CommunityStore>(
  headers: &HeaderMap,
  store: &S,
) -> Result<Person, ApiError> {
  let (username, password) = basic_credentials(headers).ok_or(ApiError::Unauthorized)?;

  let creds = store
    .credentials(&username)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash =
    PasswordHash::new(&creds.password_hash).map_err(|_| ApiError::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| {
      tracing::debug!(%username, "rejected credentials");
      ApiError::Unauthorized
    })?;

  store
    .get_person(creds.person_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::Unauthorized)
}

impl<S: CommunityStore + 'static> FromRequestParts<AppState<S>> for Authenticated {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    Ok(Authenticated(verify_auth(&parts.headers, state.store.as_ref()).await?))
  }
}

impl<S: CommunityStore + 'static> FromRequestParts<AppState<S>> for MaybeAuthenticated {
  type Rejection = std::convert::Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    if !parts.headers.contains_key(header::AUTHORIZATION) {
      return Ok(MaybeAuthenticated(None));
    }
    Ok(MaybeAuthenticated(verify_auth(&parts.headers, state.store.as_ref()).await.ok()))
  }
}
