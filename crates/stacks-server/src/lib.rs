//! HTTP server wiring for Stacks.
//!
//! Mounts the JSON API under `/api`, requires HTTP Basic auth for anything
//! that is not a read, and traces every request.

pub mod auth;
pub mod sweep;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  extract::{Request, State},
  http::Method,
  middleware::{self, Next},
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use stacks_core::{Circulation, store::CirculationStore};
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, verify_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `STACKS_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  /// How long an operation waits for a title or copy lock before giving up.
  #[serde(default = "default_lock_timeout_ms")]
  pub lock_timeout_ms:     u64,
  #[serde(default = "default_sweep_interval_secs")]
  pub sweep_interval_secs: u64,
  /// Offset of the library's local time from UTC; decides what "today" is.
  #[serde(default)]
  pub utc_offset_minutes:  i32,
}

fn default_lock_timeout_ms() -> u64 { 2_000 }

fn default_sweep_interval_secs() -> u64 { 60 }

impl ServerConfig {
  pub fn lock_timeout(&self) -> Duration { Duration::from_millis(self.lock_timeout_ms) }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_secs.max(1))
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the router.
pub struct AppState<S> {
  pub circulation: Arc<Circulation<S>>,
  pub auth:        Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { circulation: self.circulation.clone(), auth: self.auth.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the top-level axum [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: CirculationStore + 'static,
{
  Router::new()
    .nest("/api", stacks_api::api_router(state.circulation))
    .layer(middleware::from_fn_with_state(state.auth, require_auth))
    .layer(TraceLayer::new_for_http())
}

/// Reads are open; everything else needs valid credentials.
async fn require_auth(
  State(auth): State<Arc<AuthConfig>>,
  req: Request,
  next: Next,
) -> Response {
  let method = req.method();
  if method != Method::GET && method != Method::HEAD {
    if let Err(e) = verify_auth(req.headers(), &auth) {
      tracing::debug!(%method, uri = %req.uri(), "rejected unauthenticated request");
      return e.into_response();
    }
  }
  next.run(req).await
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use rand_core::OsRng;
  use serde_json::json;
  use stacks_core::clock::SystemClock;
  use stacks_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();

    AppState {
      circulation: Arc::new(Circulation::new(
        store,
        Arc::new(SystemClock::utc()),
        Duration::from_millis(500),
      )),
      auth: Arc::new(AuthConfig { username: "librarian".to_string(), password_hash: hash }),
    }
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn oneshot_raw(
    state: AppState<SqliteStore>,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<serde_json::Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    router(state).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  #[tokio::test]
  async fn reads_need_no_credentials() {
    let state = make_state("secret").await;
    let res = oneshot_raw(state, Method::GET, "/api/settings", None, None).await;
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn writes_need_credentials() {
    let state = make_state("secret").await;
    let body = json!({ "borrower_id": Uuid::new_v4(), "role": "student" });

    let res =
      oneshot_raw(state.clone(), Method::POST, "/api/borrowers", None, Some(body.clone())).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

    let bad = auth_header("librarian", "wrong");
    let res = oneshot_raw(
      state.clone(),
      Method::POST,
      "/api/borrowers",
      Some(&bad),
      Some(body.clone()),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let good = auth_header("librarian", "secret");
    let res =
      oneshot_raw(state.clone(), Method::POST, "/api/borrowers", Some(&good), Some(body)).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = oneshot_raw(state, Method::GET, "/api/borrowers", None, None).await;
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn unknown_paths_are_not_found() {
    let state = make_state("secret").await;
    let res = oneshot_raw(state, Method::GET, "/dav/", None, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[test]
  fn config_defaults_fill_optional_fields() {
    let cfg: ServerConfig = config::Config::builder()
      .set_override("host", "127.0.0.1")
      .unwrap()
      .set_override("port", 8080)
      .unwrap()
      .set_override("store_path", "~/stacks.db")
      .unwrap()
      .set_override("auth_username", "librarian")
      .unwrap()
      .set_override("auth_password_hash", "x")
      .unwrap()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(cfg.lock_timeout(), Duration::from_secs(2));
    assert_eq!(cfg.sweep_interval(), Duration::from_secs(60));
    assert_eq!(cfg.utc_offset_minutes, 0);
  }
}
