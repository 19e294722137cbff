//! Read-side queries, and the [`EntityLoader`] the policy engine reads
//! through.

use custos_core::{
  entity::{EntityKind, EntityRef},
  state::{EntityLoader, EntityState, LoadError},
  store::Record,
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  Result,
  encode::{RawRecord, decode_kind, encode_kind, table},
};

/// Loads entity state through the connection (or transaction) a write runs
/// on, so guard decisions see exactly what the write will see.
pub struct TxLoader<'a>(pub &'a Connection);

impl TxLoader<'_> {
  fn state(&self, kind: EntityKind, id: &str) -> Result<Option<EntityState>> {
    let Some(raw) = raw_record(self.0, kind, id)? else {
      return Ok(None);
    };
    let links = match kind {
      EntityKind::Party | EntityKind::License => Vec::new(),
      _ => links(self.0, id)?,
    };
    raw.into_state(links).map(Some)
  }

  fn stream_groups(&self, stream: &EntityRef) -> Result<Vec<EntityState>> {
    let mut stmt = self.0.prepare(
      "SELECT DISTINCT l.container_id FROM links l
         JOIN entities o ON o.entity_id = l.member_id
        WHERE o.parent_id = ?1 AND o.kind = ?2
        ORDER BY 1",
    )?;
    let ids = stmt
      .query_map(rusqlite::params![stream.id, encode_kind(EntityKind::Observation)], |r| {
        r.get::<_, String>(0)
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
      groups.extend(self.state(EntityKind::ObservationGroup, &id)?);
    }
    Ok(groups)
  }
}

impl EntityLoader for TxLoader<'_> {
  fn get(&self, kind: EntityKind, id: &str) -> Result<Option<EntityState>, LoadError> {
    self.state(kind, id).map_err(LoadError::from)
  }

  fn groups_of_stream(&self, stream: &EntityRef) -> Result<Vec<EntityState>, LoadError> {
    self.stream_groups(stream).map_err(LoadError::from)
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

pub fn exists(conn: &Connection, kind: EntityKind, id: &str) -> Result<bool> {
  let found = match kind {
    EntityKind::Party | EntityKind::License => {
      let (table, pk) = table(kind);
      conn
        .query_row(&format!("SELECT 1 FROM {table} WHERE {pk} = ?1"), [id], |_| Ok(()))
        .optional()?
    }
    _ => conn
      .query_row(
        "SELECT 1 FROM entities WHERE entity_id = ?1 AND kind = ?2",
        rusqlite::params![id, encode_kind(kind)],
        |_| Ok(()),
      )
      .optional()?,
  };
  Ok(found.is_some())
}

pub fn raw_record(conn: &Connection, kind: EntityKind, id: &str) -> Result<Option<RawRecord>> {
  let raw = match kind {
    EntityKind::Party => conn
      .query_row(
        "SELECT party_id, body_json, created_at, updated_at FROM parties WHERE party_id = ?1",
        [id],
        |r| {
          let id: String = r.get(0)?;
          Ok(RawRecord {
            kind,
            owner: Some(id.clone()),
            id,
            license: None,
            parent: None,
            body: r.get(1)?,
            created_at: r.get(2)?,
            updated_at: r.get(3)?,
          })
        },
      )
      .optional()?,

    EntityKind::License => conn
      .query_row(
        "SELECT license_id, body_json, created_at, updated_at FROM licenses \
         WHERE license_id = ?1",
        [id],
        |r| {
          let id: String = r.get(0)?;
          Ok(RawRecord {
            kind,
            owner: None,
            license: Some(id.clone()),
            id,
            parent: None,
            body: r.get(1)?,
            created_at: r.get(2)?,
            updated_at: r.get(3)?,
          })
        },
      )
      .optional()?,

    _ => conn
      .query_row(
        "SELECT e.entity_id, e.owner_id, e.license_id, p.kind, e.parent_id,
                e.body_json, e.created_at, e.updated_at
           FROM entities e
           LEFT JOIN entities p ON p.entity_id = e.parent_id
          WHERE e.entity_id = ?1 AND e.kind = ?2",
        rusqlite::params![id, encode_kind(kind)],
        |r| {
          let parent_kind: Option<String> = r.get(3)?;
          let parent_id: Option<String> = r.get(4)?;
          Ok(RawRecord {
            kind,
            id: r.get(0)?,
            owner: r.get(1)?,
            license: r.get(2)?,
            parent: parent_kind.zip(parent_id),
            body: r.get(5)?,
            created_at: r.get(6)?,
            updated_at: r.get(7)?,
          })
        },
      )
      .optional()?,
  };
  Ok(raw)
}

/// Memberships of an entity in either direction, ordered by kind then id.
pub fn links(conn: &Connection, id: &str) -> Result<Vec<EntityRef>> {
  let mut stmt = conn.prepare(
    "SELECT e.kind, e.entity_id FROM links l
       JOIN entities e ON e.entity_id = l.member_id
      WHERE l.container_id = ?1
     UNION ALL
     SELECT e.kind, e.entity_id FROM links l
       JOIN entities e ON e.entity_id = l.container_id
      WHERE l.member_id = ?1
     ORDER BY 1, 2",
  )?;
  let rows = stmt
    .query_map([id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(|(kind, id)| Ok(EntityRef::new(decode_kind(&kind)?, id)))
    .collect()
}

pub fn load_record(conn: &Connection, kind: EntityKind, id: &str) -> Result<Option<Record>> {
  let Some(raw) = raw_record(conn, kind, id)? else {
    return Ok(None);
  };
  let links = match kind {
    EntityKind::Party | EntityKind::License => Vec::new(),
    _ => links(conn, id)?,
  };
  raw.into_record(links).map(Some)
}
