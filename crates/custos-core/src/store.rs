//! The `CatalogStore` trait and the record type it returns.
//!
//! The trait is implemented by storage backends (e.g. `custos-store-sqlite`).
//! The API depends on this abstraction, not on any concrete backend. Every
//! mutating method takes the acting principal explicitly; backends are
//! responsible for running the policy guards before the write is committed.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Classify,
  entity::{EntityKind, EntityRef},
  party::PartyId,
  payload::{Patch, Payload},
  principal::Principal,
};

// ─── Record ──────────────────────────────────────────────────────────────────

/// A persisted entity in its generic, kind-independent shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
  pub kind:       EntityKind,
  pub id:         String,
  /// Owner Party, for owned kinds. A Party record points at itself.
  pub party:      Option<PartyId>,
  pub license:    Option<String>,
  pub parent:     Option<EntityRef>,
  /// Entities linked by membership (group ⇄ observation, campaign ⇄ stream).
  pub links:      Vec<EntityRef>,
  /// Every non-structural attribute, as submitted.
  pub body:       serde_json::Value,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a catalog storage backend with policy enforcement.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// Create an entity. Inline sub-entities (owner Party, License, groups) are
  /// created in the same transaction.
  fn create(
    &self,
    principal: Option<Principal>,
    payload: Payload,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Retrieve an entity by kind and id. Returns `None` if not found.
  fn get(
    &self,
    kind: EntityKind,
    id: String,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// Apply a merge-patch to an existing entity. Attributes set to `null` are
  /// removed.
  fn update(
    &self,
    principal: Option<Principal>,
    id: String,
    patch: Patch,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Delete an entity.
  fn delete(
    &self,
    principal: Option<Principal>,
    kind: EntityKind,
    id: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
