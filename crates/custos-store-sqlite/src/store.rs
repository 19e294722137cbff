//! [`SqliteStore`], the SQLite implementation of [`CatalogStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use custos_core::{
  entity::EntityKind,
  payload::{Patch, Payload},
  principal::Principal,
  store::{CatalogStore, Record},
};
use custos_policy::{PolicyEngine, reserved::seed_licenses};
use tracing::info;

use crate::{
  Result,
  encode::{encode_dt, encode_kind},
  loader::load_record,
  schema::SCHEMA,
  write::Writer,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Custos catalog backed by a single SQLite file.
///
/// Cloning is cheap: the connection handle and the engine are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  engine: Arc<PolicyEngine>,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, initialise the schema and seed the
  /// predefined licences.
  pub async fn open(path: impl AsRef<Path>, engine: PolicyEngine) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, engine).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(engine: PolicyEngine) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, engine).await
  }

  async fn init(conn: tokio_rusqlite::Connection, engine: PolicyEngine) -> Result<Self> {
    let seeds = seed_licenses(&engine.config().default_license_domain)
      .into_iter()
      .map(|license| Ok((license.id.clone(), serde_json::to_string(&license)?)))
      .collect::<Result<Vec<_>>>()?;
    let now = encode_dt(Utc::now());

    let seeded = conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;
        let mut inserted = 0;
        for (id, body) in &seeds {
          inserted += conn.execute(
            "INSERT OR IGNORE INTO licenses (license_id, body_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![id, body, now],
          )?;
        }
        Ok(inserted)
      })
      .await?;
    if seeded > 0 {
      info!(count = seeded, "seeded predefined licences");
    }

    Ok(Self { conn, engine: Arc::new(engine) })
  }

  pub fn engine(&self) -> &PolicyEngine { &self.engine }

  /// Run `f` inside a transaction, committing only if it succeeds.
  async fn write<T, F>(&self, principal: Option<Principal>, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Writer<'_>) -> Result<T> + Send + 'static,
  {
    let engine = Arc::clone(&self.engine);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcome = f(&Writer::new(&tx, &engine, principal.as_ref()));
        if outcome.is_ok() {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?
  }

  /// Number of stored entities of `kind`.
  pub async fn count(&self, kind: EntityKind) -> Result<usize> {
    let n = self
      .conn
      .call(move |conn| {
        let n: i64 = match kind {
          EntityKind::Party => {
            conn.query_row("SELECT COUNT(*) FROM parties", [], |r| r.get(0))?
          }
          EntityKind::License => {
            conn.query_row("SELECT COUNT(*) FROM licenses", [], |r| r.get(0))?
          }
          _ => conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE kind = ?1",
            [encode_kind(kind)],
            |r| r.get(0),
          )?,
        };
        Ok(n)
      })
      .await?;
    Ok(n as usize)
  }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = crate::Error;

  async fn create(&self, principal: Option<Principal>, payload: Payload) -> Result<Record> {
    self.write(principal, move |w| w.create(payload)).await
  }

  async fn get(&self, kind: EntityKind, id: String) -> Result<Option<Record>> {
    self.conn.call(move |conn| Ok(load_record(conn, kind, &id))).await?
  }

  async fn update(
    &self,
    principal: Option<Principal>,
    id: String,
    patch: Patch,
  ) -> Result<Record> {
    self.write(principal, move |w| w.update(&id, patch)).await
  }

  async fn delete(&self, principal: Option<Principal>, kind: EntityKind, id: String) -> Result<()> {
    self.write(principal, move |w| w.delete(kind, &id)).await
  }
}
