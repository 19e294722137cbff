//! The write path: guards, nested inline entities, reference checks and the
//! SQL itself, all against one open transaction.

use chrono::{DateTime, Utc};
use custos_core::{
  entity::{EntityKind, EntityRef},
  license::{LicensePayload, LicenseRef},
  party::{PartyId, PartyIdRef, PartyPayload, PartyRef},
  payload::{GroupIdRef, GroupRef, Patch, Payload},
  principal::Principal,
  store::Record,
};
use custos_policy::{PolicyEngine, identity, ownership::owned_payload_mut};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{body_of, body_patch, decode_body, encode_dt, encode_kind, merge, table},
  loader::{TxLoader, exists, load_record},
};

/// Which end of a membership the written entity is.
#[derive(Debug, Clone, Copy)]
enum Side {
  Container,
  Member,
}

impl Side {
  fn of(kind: EntityKind) -> Self {
    match kind {
      EntityKind::ObservationGroup | EntityKind::Campaign => Self::Container,
      _ => Self::Member,
    }
  }
}

fn license_slot(payload: &mut Payload) -> Option<&mut Option<LicenseRef>> {
  match payload {
    Payload::Datastream(p) | Payload::MultiDatastream(p) => Some(&mut p.license),
    Payload::ObservationGroup(p) => Some(&mut p.license),
    Payload::Campaign(p) => Some(&mut p.license),
    _ => None,
  }
}

// ─── Writer ──────────────────────────────────────────────────────────────────

/// One write, bound to its transaction and acting principal.
pub struct Writer<'a> {
  conn:      &'a Connection,
  engine:    &'a PolicyEngine,
  principal: Option<&'a Principal>,
  now:       DateTime<Utc>,
}

impl<'a> Writer<'a> {
  pub fn new(
    conn: &'a Connection,
    engine: &'a PolicyEngine,
    principal: Option<&'a Principal>,
  ) -> Self {
    Self { conn, engine, principal, now: Utc::now() }
  }

  fn loader(&self) -> TxLoader<'a> { TxLoader(self.conn) }

  fn record(&self, kind: EntityKind, id: &str) -> Result<Record> {
    load_record(self.conn, kind, id)?
      .ok_or_else(|| Error::NotFound { kind, id: id.to_owned() })
  }

  fn require(&self, kind: EntityKind, id: &str) -> Result<()> {
    if exists(self.conn, kind, id)? {
      Ok(())
    } else {
      Err(Error::DanglingReference { kind, id: id.to_owned() })
    }
  }

  // ── Create ────────────────────────────────────────────────────────────────

  pub fn create(&self, payload: Payload) -> Result<Record> {
    let payload = self.engine.before_create(self.principal, &self.loader(), payload)?;
    let payload = self.resolve_inline(payload)?;
    let payload = self.engine.after_create_validated(self.principal, &self.loader(), payload)?;

    let kind = payload.kind();
    let id = match payload {
      Payload::Party(party) => self.put_party(party)?,
      Payload::License(license) => self.insert_license(license)?,
      other => self.insert_entity(other)?,
    };
    debug!(%kind, %id, "created");
    self.record(kind, &id)
  }

  /// Replace inline Party, License and ObservationGroup payloads with
  /// references to entities created here, each through its own guards.
  fn resolve_inline(&self, mut payload: Payload) -> Result<Payload> {
    if let Some(owned) = owned_payload_mut(&mut payload) {
      let slot = owned.party_mut();
      if let Some(PartyRef::Inline(party)) = slot.as_ref() {
        let record = self.create(Payload::Party(party.clone()))?;
        *slot = Some(PartyRef::Id(PartyIdRef { id: record.id }));
      }
    }

    if let Some(slot) = license_slot(&mut payload) {
      if let Some(LicenseRef::Inline(license)) = slot.as_ref() {
        let record = self.create(Payload::License(license.clone()))?;
        *slot = Some(LicenseRef::by_id(record.id));
      }
    }

    if let Payload::Observation(obs) = &mut payload {
      for group in obs.groups.iter_mut().flatten() {
        if let GroupRef::Inline(inline) = &*group {
          let record = self.create(Payload::ObservationGroup(inline.clone()))?;
          *group = GroupRef::Id(GroupIdRef { id: Uuid::parse_str(&record.id)? });
        }
      }
    }

    Ok(payload)
  }

  /// Create a Party, or return the existing one with the same derived id.
  /// Admins overwrite an existing Party instead.
  fn put_party(&self, party: PartyPayload) -> Result<String> {
    let auth_id = party
      .auth_id
      .clone()
      .ok_or_else(|| Error::Invalid("Party must have an authId".into()))?;
    let id = PartyId::from_auth_id(&auth_id).to_string();
    let body = serde_json::to_string(&party)?;
    let now = encode_dt(self.now);

    if exists(self.conn, EntityKind::Party, &id)? {
      if identity::is_admin(self.principal) {
        self.conn.execute(
          "UPDATE parties SET auth_id = ?2, body_json = ?3, updated_at = ?4 WHERE party_id = ?1",
          rusqlite::params![id, auth_id, body, now],
        )?;
      }
      return Ok(id);
    }

    self.conn.execute(
      "INSERT INTO parties (party_id, auth_id, body_json, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?4)",
      rusqlite::params![id, auth_id, body, now],
    )?;
    Ok(id)
  }

  fn insert_license(&self, license: LicensePayload) -> Result<String> {
    let id = license
      .id
      .clone()
      .filter(|id| !id.trim().is_empty())
      .ok_or_else(|| Error::Invalid("License must have an id".into()))?;
    if exists(self.conn, EntityKind::License, &id)? {
      return Err(Error::Conflict(format!("License {id} already exists")));
    }
    let body = serde_json::to_string(&license)?;
    self.conn.execute(
      "INSERT INTO licenses (license_id, body_json, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?3)",
      rusqlite::params![id, body, encode_dt(self.now)],
    )?;
    Ok(id)
  }

  fn insert_entity(&self, payload: Payload) -> Result<String> {
    let kind = payload.kind();
    let id = Uuid::new_v4().to_string();
    let owner = self.owner_of(&payload)?;
    let license = self.license_of(&payload)?;
    let parent = self.parent_of(&payload)?;
    if kind.is_derived_owned() && parent.is_none() {
      let wanted = match kind {
        EntityKind::Relation => "a subject Observation",
        _ => "a Datastream or MultiDatastream",
      };
      return Err(Error::Invalid(format!("{kind} must reference {wanted}")));
    }
    self.check_references(&payload)?;

    let body = serde_json::to_string(&body_of(&payload)?)?;
    self.conn.execute(
      "INSERT INTO entities (
         entity_id, kind, owner_id, license_id, parent_id,
         body_json, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
      rusqlite::params![
        id,
        encode_kind(kind),
        owner,
        license,
        parent.map(|p| p.id),
        body,
        encode_dt(self.now),
      ],
    )?;
    self.replace_links(&id, &payload)?;
    Ok(id)
  }

  // ── References ────────────────────────────────────────────────────────────

  fn owner_of(&self, payload: &Payload) -> Result<Option<String>> {
    let owner = payload.party().map(PartyRef::declared_id).transpose()?.flatten();
    let Some(owner) = owner else { return Ok(None) };
    let owner = owner.to_string();
    self.require(EntityKind::Party, &owner)?;
    Ok(Some(owner))
  }

  fn license_of(&self, payload: &Payload) -> Result<Option<String>> {
    let Some(license) = payload.license().and_then(LicenseRef::id) else {
      return Ok(None);
    };
    self.require(EntityKind::License, license)?;
    Ok(Some(license.to_owned()))
  }

  fn parent_of(&self, payload: &Payload) -> Result<Option<EntityRef>> {
    let parent = match payload {
      Payload::Observation(p) => p.stream()?,
      Payload::Relation(p) => p.subject.map(|id| (EntityKind::Observation, id)),
      _ => None,
    };
    let Some((kind, id)) = parent else { return Ok(None) };
    let parent = EntityRef::new(kind, id.to_string());
    self.require(kind, &parent.id)?;
    Ok(Some(parent))
  }

  /// References kept in the body rather than in columns.
  fn check_references(&self, payload: &Payload) -> Result<()> {
    let refs = match payload {
      Payload::Datastream(p) | Payload::MultiDatastream(p) => {
        vec![(EntityKind::Thing, p.thing)]
      }
      Payload::Relation(p) => vec![
        (EntityKind::Observation, p.object),
        (EntityKind::ObservationGroup, p.group),
      ],
      _ => Vec::new(),
    };
    for (kind, id) in refs {
      if let Some(id) = id {
        self.require(kind, &id.to_string())?;
      }
    }
    Ok(())
  }

  /// Replace each membership set the payload declares.
  fn replace_links(&self, id: &str, payload: &Payload) -> Result<()> {
    let side = Side::of(payload.kind());
    for (other_kind, ids) in payload.memberships() {
      let (own, other) = match side {
        Side::Container => ("container_id", "member_id"),
        Side::Member => ("member_id", "container_id"),
      };
      self.conn.execute(
        &format!(
          "DELETE FROM links WHERE {own} = ?1
             AND {other} IN (SELECT entity_id FROM entities WHERE kind = ?2)"
        ),
        rusqlite::params![id, encode_kind(other_kind)],
      )?;
      for other_id in ids {
        let other_id = other_id.to_string();
        self.require(other_kind, &other_id)?;
        let (container, member) = match side {
          Side::Container => (id, other_id.as_str()),
          Side::Member => (other_id.as_str(), id),
        };
        self.conn.execute(
          "INSERT OR IGNORE INTO links (container_id, member_id) VALUES (?1, ?2)",
          rusqlite::params![container, member],
        )?;
      }
    }
    Ok(())
  }

  // ── Update ────────────────────────────────────────────────────────────────

  pub fn update(&self, id: &str, patch: Patch) -> Result<Record> {
    let Patch { payload, cleared } = patch;
    let kind = payload.kind();
    if !exists(self.conn, kind, id)? {
      return Err(Error::NotFound { kind, id: id.to_owned() });
    }
    let payload = self.engine.before_update(self.principal, &self.loader(), id, payload)?;
    let payload = self.resolve_inline(payload)?;

    let id = match payload {
      Payload::Party(party) => {
        let id = match &party.auth_id {
          Some(auth_id) => self.rekey_party(id, auth_id)?,
          None => id.to_owned(),
        };
        self.merge_body(kind, &id, &Payload::Party(party), &cleared)?;
        id
      }
      Payload::License(license) => {
        if license.id.as_deref().is_some_and(|new| new != id) {
          return Err(Error::Invalid("License id cannot be changed".into()));
        }
        self.merge_body(kind, id, &Payload::License(license), &cleared)?;
        id.to_owned()
      }
      other => {
        self.patch_entity(id, &other, &cleared)?;
        id.to_owned()
      }
    };
    debug!(%kind, %id, "updated");
    self.record(kind, &id)
  }

  /// Move Party `id` to the id derived from `auth_id`, carrying its owned
  /// entities along. Returns the id the Party ends up with.
  fn rekey_party(&self, id: &str, auth_id: &str) -> Result<String> {
    let new_id = PartyId::from_auth_id(auth_id).to_string();
    if new_id == id {
      return Ok(new_id);
    }
    if !identity::is_admin(self.principal) {
      return Err(Error::Invalid("Party authId cannot be changed".into()));
    }
    if exists(self.conn, EntityKind::Party, &new_id)? {
      return Err(Error::Conflict(format!("Party {new_id} already exists")));
    }
    self.conn.execute(
      "UPDATE parties SET party_id = ?2, auth_id = ?3 WHERE party_id = ?1",
      rusqlite::params![id, new_id, auth_id],
    )?;
    debug!(from = id, to = %new_id, "re-keyed Party");
    Ok(new_id)
  }

  fn merge_body(&self, kind: EntityKind, id: &str, patch: &Payload, cleared: &[String]) -> Result<()> {
    let (table, pk) = table(kind);
    let current: String = self.conn.query_row(
      &format!("SELECT body_json FROM {table} WHERE {pk} = ?1"),
      [id],
      |r| r.get(0),
    )?;
    let mut body = decode_body(&current)?;
    merge(&mut body, body_patch(patch, cleared)?);
    self.conn.execute(
      &format!("UPDATE {table} SET body_json = ?2, updated_at = ?3 WHERE {pk} = ?1"),
      rusqlite::params![id, serde_json::to_string(&body)?, encode_dt(self.now)],
    )?;
    Ok(())
  }

  fn patch_entity(&self, id: &str, patch: &Payload, cleared: &[String]) -> Result<()> {
    let owner = self.owner_of(patch)?;
    let license = self.license_of(patch)?;
    let parent = self.parent_of(patch)?;
    self.check_references(patch)?;

    self.conn.execute(
      "UPDATE entities SET
         owner_id   = COALESCE(?2, owner_id),
         license_id = COALESCE(?3, license_id),
         parent_id  = COALESCE(?4, parent_id)
       WHERE entity_id = ?1",
      rusqlite::params![id, owner, license, parent.map(|p| p.id)],
    )?;
    self.replace_links(id, patch)?;
    self.merge_body(patch.kind(), id, patch, cleared)
  }

  // ── Delete ────────────────────────────────────────────────────────────────

  pub fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
    if !exists(self.conn, kind, id)? {
      return Err(Error::NotFound { kind, id: id.to_owned() });
    }
    self.engine.before_delete(self.principal, &self.loader(), kind, id)?;
    let (table, pk) = table(kind);
    self.conn.execute(&format!("DELETE FROM {table} WHERE {pk} = ?1"), [id])?;
    debug!(%kind, %id, "deleted");
    Ok(())
  }
}
