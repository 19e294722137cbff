//! Party: the canonical owner identity.
//!
//! One Party exists per distinct external identity. Its id is never chosen by
//! a client: it is derived from the `authId`, so the same identity always
//! lands on the same Party regardless of which identity provider issued it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Namespace for name-based Party ids.
const PARTY_NAMESPACE: Uuid =
  Uuid::from_u128(0x6f1c_5a52_8d3e_4b07_9a41_2c7e_0d5f_93b8);

// ─── PartyId ─────────────────────────────────────────────────────────────────

/// The canonical identifier of a Party.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartyId(Uuid);

impl PartyId {
  pub fn from_uuid(id: Uuid) -> Self { Self(id) }

  /// Derive the canonical id for an external identity string.
  ///
  /// A UUID-formatted identity is taken verbatim; anything else, the empty
  /// string included, is hashed byte-for-byte into a version-3 UUID, so the
  /// mapping is total, pure and reproducible.
  pub fn from_auth_id(auth_id: &str) -> Self {
    match Uuid::parse_str(auth_id) {
      Ok(id) => Self(id),
      Err(_) => Self(Uuid::new_v3(&PARTY_NAMESPACE, auth_id.as_bytes())),
    }
  }

  /// Parse a Party id that must already be a UUID (a reference by `id`).
  pub fn parse(id: &str) -> Result<Self> {
    Uuid::parse_str(id.trim())
      .map(Self)
      .map_err(|_| Error::InvalidPartyId(id.to_owned()))
  }

  pub fn as_uuid(&self) -> Uuid { self.0 }
}

impl std::fmt::Display for PartyId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.hyphenated())
  }
}

// ─── Party ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
  #[default]
  Individual,
  Institutional,
}

/// A persisted Party. Invariant: `id == PartyId::from_auth_id(auth_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
  pub id:           PartyId,
  pub auth_id:      String,
  pub role:         PartyRole,
  pub display_name: Option<String>,
  pub description:  Option<String>,
}

/// A Party as submitted by a client, either as a create body, an inline owner
/// or a merge-patch. Every field is optional; the policy layer fills in
/// `auth_id` for the acting caller where the request leaves it out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auth_id:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role:         Option<PartyRole>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:  Option<String>,
}

impl PartyPayload {
  pub fn for_auth_id(auth_id: impl Into<String>) -> Self {
    Self { auth_id: Some(auth_id.into()), ..Self::default() }
  }
}

// ─── PartyRef ────────────────────────────────────────────────────────────────

/// Reference to an existing Party by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartyIdRef {
  pub id: String,
}

/// Reference to an existing Party by its `authId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PartyAuthRef {
  pub auth_id: String,
}

/// The owner link of an owned entity: a reference to an existing Party, or a
/// full Party payload to be created inline.
///
/// Variant order matters for deserialisation: a bare `{"id": ..}` or
/// `{"authId": ..}` object is a reference, anything richer is inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartyRef {
  Id(PartyIdRef),
  AuthId(PartyAuthRef),
  Inline(PartyPayload),
}

impl PartyRef {
  pub fn by_id(id: PartyId) -> Self {
    Self::Id(PartyIdRef { id: id.to_string() })
  }

  /// The Party this reference names, if it names one.
  ///
  /// An inline payload without `authId` names nobody yet and yields `None`.
  /// Malformed ids are an error.
  pub fn declared_id(&self) -> Result<Option<PartyId>> {
    match self {
      Self::Id(r) => PartyId::parse(&r.id).map(Some),
      Self::AuthId(r) => Ok(Some(PartyId::from_auth_id(&r.auth_id))),
      Self::Inline(p) => Ok(p.auth_id.as_deref().map(PartyId::from_auth_id)),
    }
  }
}
