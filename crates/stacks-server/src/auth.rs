//! HTTP Basic-auth verification for mutating requests.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use thiserror::Error;

/// Credentials accepted as valid for this server instance.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

#[derive(Debug, Error)]
#[error("unauthorized")]
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
  fn into_response(self) -> Response {
    let mut res = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    res.headers_mut().insert(
      header::WWW_AUTHENTICATE,
      HeaderValue::from_static("Basic realm=\"stacks\""),
    );
    res
  }
}

/// Check the `Authorization` header against `config`.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Unauthorized> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Unauthorized)?;

  let encoded = header_val.strip_prefix("Basic ").ok_or(Unauthorized)?;
  let decoded = B64.decode(encoded).map_err(|_| Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Unauthorized)?;
  let (username, password) = creds.split_once(':').ok_or(Unauthorized)?;

  if username != config.username {
    return Err(Unauthorized);
  }

  let parsed_hash = PasswordHash::new(&config.password_hash).map_err(|_| Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Unauthorized)
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use rand_core::OsRng;

  use super::*;

  fn config(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    AuthConfig { username: "librarian".to_string(), password_hash: hash }
  }

  fn headers(value: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    map
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  #[test]
  fn correct_credentials() {
    let cfg = config("secret");
    assert!(verify_auth(&headers(&basic("librarian", "secret")), &cfg).is_ok());
  }

  #[test]
  fn wrong_password_or_user() {
    let cfg = config("secret");
    assert!(verify_auth(&headers(&basic("librarian", "wrong")), &cfg).is_err());
    assert!(verify_auth(&headers(&basic("someone", "secret")), &cfg).is_err());
  }

  #[test]
  fn missing_or_malformed_header() {
    let cfg = config("secret");
    assert!(verify_auth(&HeaderMap::new(), &cfg).is_err());
    assert!(verify_auth(&headers("Basic !!!not-base64!!!"), &cfg).is_err());
    assert!(verify_auth(&headers("Bearer token"), &cfg).is_err());
  }

  #[test]
  fn rejection_challenges_for_basic() {
    let res = Unauthorized.into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
      res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
      "Basic realm=\"stacks\""
    );
  }
}
