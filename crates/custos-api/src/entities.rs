//! Generic handlers for every entity collection.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST`   | `/{collection}` | create; 201 + stored record |
//! | `GET`    | `/{collection}/{id}` | 404 if not found |
//! | `PATCH`  | `/{collection}/{id}` | merge-patch, `null` removes; 200 + stored record |
//! | `DELETE` | `/{collection}/{id}` | 204 |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use custos_core::{
  entity::EntityKind,
  payload::{Patch, Payload},
  store::{CatalogStore, Record},
};
use serde_json::Value;

use crate::{AppState, auth::Caller, error::ApiError};

fn collection_kind(collection: &str) -> Result<EntityKind, ApiError> {
  EntityKind::from_collection(collection)
    .map_err(|_| ApiError::NotFound(format!("unknown collection {collection}")))
}

fn decode(kind: EntityKind, body: Value) -> Result<Payload, ApiError> {
  Payload::from_json(kind, body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// `POST /{collection}`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Caller(principal): Caller,
  Path(collection): Path<String>,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CatalogStore + 'static,
{
  let kind = collection_kind(&collection)?;
  let payload = decode(kind, body)?;
  let record = state
    .store
    .create(principal, payload)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /{collection}/{id}`
///
/// Reads are open to anonymous callers, but a supplied `Authorization`
/// header must still verify.
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Caller(_): Caller,
  Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError>
where
  S: CatalogStore + 'static,
{
  let kind = collection_kind(&collection)?;
  state
    .store
    .get(kind, id.clone())
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("{kind} {id} not found")))
}

/// `PATCH /{collection}/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Caller(principal): Caller,
  Path((collection, id)): Path<(String, String)>,
  Json(body): Json<Value>,
) -> Result<Json<Record>, ApiError>
where
  S: CatalogStore + 'static,
{
  let kind = collection_kind(&collection)?;
  let patch = Patch::from_json(kind, body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let record = state
    .store
    .update(principal, id, patch)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(record))
}

/// `DELETE /{collection}/{id}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  Caller(principal): Caller,
  Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError>
where
  S: CatalogStore + 'static,
{
  let kind = collection_kind(&collection)?;
  state
    .store
    .delete(principal, kind, id)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
