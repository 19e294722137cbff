//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, ids are hyphenated lowercase UUIDs (or
//! the client-chosen id for Licenses), bodies are compact JSON objects.

use chrono::{DateTime, Utc};
use custos_core::{
  entity::{EntityKind, EntityRef},
  party::PartyId,
  payload::Payload,
  state::EntityState,
  store::Record,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_kind(kind: EntityKind) -> &'static str { kind.into() }

pub fn decode_kind(s: &str) -> Result<EntityKind> {
  s.parse()
    .map_err(|_| Error::Core(custos_core::Error::UnknownEntityKind(s.to_owned())))
}

pub fn decode_party_id(s: &str) -> Result<PartyId> {
  Ok(PartyId::from_uuid(Uuid::parse_str(s)?))
}

/// Table and primary-key column holding entities of `kind`.
pub fn table(kind: EntityKind) -> (&'static str, &'static str) {
  match kind {
    EntityKind::Party => ("parties", "party_id"),
    EntityKind::License => ("licenses", "license_id"),
    _ => ("entities", "entity_id"),
  }
}

// ─── Bodies ──────────────────────────────────────────────────────────────────

/// Payload fields stored in columns or in `links` rather than in the body.
const STRUCTURAL: &[&str] = &[
  "party",
  "license",
  "datastream",
  "multiDatastream",
  "subject",
  "groups",
  "observations",
  "campaigns",
  "datastreams",
  "multiDatastreams",
];

/// The non-structural attributes of a payload.
pub fn body_of(payload: &Payload) -> Result<Map<String, Value>> {
  let mut body = match payload.to_json()? {
    Value::Object(map) => map,
    _ => Map::new(),
  };
  for key in STRUCTURAL {
    body.remove(*key);
  }
  Ok(body)
}

/// The body changes of a merge-patch: the attributes it sets, plus a `null`
/// for every cleared attribute. Structural links cannot be cleared this way.
pub fn body_patch(payload: &Payload, cleared: &[String]) -> Result<Map<String, Value>> {
  let mut changes = body_of(payload)?;
  for key in cleared {
    if !STRUCTURAL.contains(&key.as_str()) {
      changes.insert(key.clone(), Value::Null);
    }
  }
  Ok(changes)
}

/// Apply a merge-patch body: present keys replace, `null` removes.
pub fn merge(body: &mut Map<String, Value>, patch: Map<String, Value>) {
  for (key, value) in patch {
    if value.is_null() {
      body.remove(&key);
    } else {
      body.insert(key, value);
    }
  }
}

pub fn decode_body(s: &str) -> Result<Map<String, Value>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A row of any entity table, as read from SQLite.
#[derive(Debug)]
pub struct RawRecord {
  pub kind:       EntityKind,
  pub id:         String,
  pub owner:      Option<String>,
  pub license:    Option<String>,
  /// `(kind, id)` of the parent row.
  pub parent:     Option<(String, String)>,
  pub body:       String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawRecord {
  fn parent_ref(&self) -> Result<Option<EntityRef>> {
    self
      .parent
      .as_ref()
      .map(|(kind, id)| Ok(EntityRef::new(decode_kind(kind)?, id.clone())))
      .transpose()
  }

  pub fn into_state(self, links: Vec<EntityRef>) -> Result<EntityState> {
    let owner = self.owner.as_deref().map(decode_party_id).transpose()?;
    let parent = self.parent_ref()?;
    Ok(EntityState {
      kind: self.kind,
      id: self.id,
      owner,
      license: self.license,
      parent,
      links,
    })
  }

  pub fn into_record(self, links: Vec<EntityRef>) -> Result<Record> {
    let party = self.owner.as_deref().map(decode_party_id).transpose()?;
    let parent = self.parent_ref()?;
    Ok(Record {
      kind: self.kind,
      id: self.id,
      party,
      license: self.license,
      parent,
      links,
      body: Value::Object(decode_body(&self.body)?),
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
