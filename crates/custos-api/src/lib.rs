//! JSON REST surface for the Custos catalog.
//!
//! Exposes an axum [`Router`] backed by any [`CatalogStore`]. Requests are
//! authenticated with HTTP Basic against the configured users; the store
//! enforces ownership and licensing for the resulting principal.

pub mod auth;
pub mod entities;
pub mod error;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use custos_core::store::CatalogStore;
use custos_policy::PolicyConfig;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::UserConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CUSTOS_`-prefixed environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub users:      Vec<UserConfig>,
  #[serde(default)]
  pub policy:     PolicyConfig,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("custos.db") }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), config: Arc::clone(&self.config) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: CatalogStore + 'static,
{
  Router::new()
    .route("/{collection}", post(entities::create::<S>))
    .route(
      "/{collection}/{id}",
      get(entities::get_one::<S>)
        .patch(entities::update::<S>)
        .delete(entities::delete::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use custos_core::party::PartyId;
  use custos_policy::PolicyEngine;
  use custos_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use super::*;

  fn user(name: &str, admin: bool) -> UserConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(format!("{name}-pw").as_bytes(), &salt)
      .unwrap()
      .to_string();
    UserConfig { username: name.to_string(), password_hash: hash, admin }
  }

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory(PolicyEngine::default())
      .await
      .expect("in-memory store");
    AppState {
      store:  Arc::new(store),
      config: Arc::new(ServerConfig {
        host:       "127.0.0.1".to_string(),
        port:       8080,
        store_path: PathBuf::from(":memory:"),
        users:      vec![user("alice", false), user("bob", false), user("root", true)],
        policy:     PolicyConfig::default(),
      }),
    }
  }

  fn auth_header(user: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{user}-pw")))
  }

  async fn send(
    state: &AppState<SqliteStore>,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header(header::AUTHORIZATION, auth_header(user));
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn anonymous_write_is_401_with_challenge() {
    let state = make_state().await;
    let resp = send(&state, "POST", "/Things", None, Some(json!({ "name": "t" }))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(json_body(resp).await["error"], "authentication required");
  }

  #[tokio::test]
  async fn bad_credentials_are_401() {
    let state = make_state().await;
    let req = Request::builder()
      .method("GET")
      .uri("/Licenses/CC_BY")
      .header(header::AUTHORIZATION, format!("Basic {}", B64.encode("alice:nope")))
      .body(Body::empty())
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn create_read_update_delete() {
    let state = make_state().await;

    let resp = send(&state, "POST", "/Things", Some("alice"), Some(json!({ "name": "t" }))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let thing = json_body(resp).await;
    let id = thing["id"].as_str().unwrap().to_string();
    assert_eq!(thing["kind"], "Thing");
    assert_eq!(thing["party"], PartyId::from_auth_id("alice").to_string());

    let resp = send(&state, "GET", &format!("/Things/{id}"), None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(
      &state,
      "PATCH",
      &format!("/Things/{id}"),
      Some("bob"),
      Some(json!({ "name": "mine now" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(
      &state,
      "PATCH",
      &format!("/Things/{id}"),
      Some("alice"),
      Some(json!({ "description": "roof" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["body"], json!({ "name": "t", "description": "roof" }));

    let resp = send(
      &state,
      "PATCH",
      &format!("/Things/{id}"),
      Some("alice"),
      Some(json!({ "description": null })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["body"], json!({ "name": "t" }));

    let resp = send(&state, "DELETE", &format!("/Things/{id}"), Some("alice"), None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&state, "GET", &format!("/Things/{id}"), None, None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn anonymous_licence_delete_is_401() {
    let state = make_state().await;
    let resp = send(
      &state,
      "POST",
      "/Licenses",
      Some("alice"),
      Some(json!({ "id": "ACME-1", "name": "Acme" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(&state, "DELETE", "/Licenses/ACME-1", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send(&state, "GET", "/Licenses/ACME-1", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn reserved_licence_is_403_even_for_admin() {
    let state = make_state().await;
    let resp = send(
      &state,
      "POST",
      "/Licenses",
      Some("root"),
      Some(json!({ "id": "CC_BY", "name": "mine" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn invalid_input_is_400() {
    let state = make_state().await;

    let resp = send(
      &state,
      "POST",
      "/Datastreams",
      Some("alice"),
      Some(json!({ "name": "t", "license": { "id": "NOPE" } })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
      &state,
      "POST",
      "/Observations",
      Some("alice"),
      Some(json!({ "datastream": "not-a-uuid" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn unknown_collection_is_404() {
    let state = make_state().await;
    let resp = send(&state, "GET", "/Sensors/1", None, None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
