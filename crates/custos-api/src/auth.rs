//! HTTP Basic-auth extractor producing the acting [`Principal`].
//!
//! A request without an `Authorization` header is anonymous; whether that is
//! acceptable is for the policy guards to decide. A header that is present
//! but does not verify is rejected outright.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use custos_core::{principal::Principal, store::CatalogStore};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// A user allowed to authenticate against this server.
#[derive(Clone, Deserialize)]
pub struct UserConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  #[serde(default)]
  pub admin:         bool,
}

/// The acting principal of a request, `None` for anonymous callers.
pub struct Caller(pub Option<Principal>);

/// Verify credentials from headers against the configured users.
pub fn authenticate(
  headers: &HeaderMap,
  users: &[UserConfig],
) -> Result<Option<Principal>, ApiError> {
  let Some(header_val) = headers.get(header::AUTHORIZATION) else {
    return Ok(None);
  };
  let header_val = header_val.to_str().map_err(|_| ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let user = users
    .iter()
    .find(|u| u.username == username)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&user.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(Some(if user.admin {
    Principal::admin(username)
  } else {
    Principal::new(username)
  }))
}

impl<S> FromRequestParts<AppState<S>> for Caller
where
  S: CatalogStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, &state.config.users).map(Caller)
  }
}
