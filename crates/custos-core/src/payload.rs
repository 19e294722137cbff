//! Request payloads for every entity kind.
//!
//! The same struct serves as a create body and as a merge-patch: every field
//! is optional, and an absent field on update means "unchanged". Structural
//! links (owner, licence, parent, memberships) are typed; everything else is
//! opaque to the policy layer and stored as-is.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::EntityKind,
  license::{LicensePayload, LicenseRef},
  party::{PartyPayload, PartyRef},
};

// ─── Owned kinds ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub properties:  Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub party:       Option<PartyRef>,
}

/// Shared by Datastream and MultiDatastream; the latter additionally uses
/// `multi_observation_data_types`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatastreamPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:                         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:                  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub observation_type:             Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unit_of_measurement:          Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub multi_observation_data_types: Option<Vec<String>>,
  /// The Thing this stream belongs to.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thing:                        Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub party:                        Option<PartyRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub license:                      Option<LicenseRef>,
  /// Campaigns this stream is part of. Replaces the current set on update.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub campaigns:                    Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationGroupPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub purpose:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub party:        Option<PartyRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub license:      Option<LicenseRef>,
  /// Member observations. Replaces the current set on update.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub observations: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:              Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:       Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url:               Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub party:             Option<PartyRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub license:           Option<LicenseRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub datastreams:       Option<Vec<Uuid>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub multi_datastreams: Option<Vec<Uuid>>,
}

// ─── Derived-ownership kinds ─────────────────────────────────────────────────

/// Reference to an existing ObservationGroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupIdRef {
  pub id: Uuid,
}

/// A group membership declared by an Observation: an existing group, or a
/// new one created inline together with the Observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
  Id(GroupIdRef),
  Inline(ObservationGroupPayload),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phenomenon_time:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result:           Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parameters:       Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub datastream:       Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub multi_datastream: Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub groups:           Option<Vec<GroupRef>>,
}

impl ObservationPayload {
  /// The stream this payload points the Observation at, if it names one.
  /// Naming both kinds of stream at once is an error.
  pub fn stream(&self) -> Result<Option<(EntityKind, Uuid)>> {
    match (self.datastream, self.multi_datastream) {
      (Some(_), Some(_)) => Err(Error::AmbiguousStream(EntityKind::Observation)),
      (Some(id), None) => Ok(Some((EntityKind::Datastream, id))),
      (None, Some(id)) => Ok(Some((EntityKind::MultiDatastream, id))),
      (None, None) => Ok(None),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role:            Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:     Option<String>,
  /// The Subject Observation; ownership of the Relation follows it.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subject:         Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub object:          Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_object: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub group:           Option<Uuid>,
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// A payload tagged with the kind of entity it describes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  Party(PartyPayload),
  Thing(ThingPayload),
  Datastream(DatastreamPayload),
  MultiDatastream(DatastreamPayload),
  ObservationGroup(ObservationGroupPayload),
  Campaign(CampaignPayload),
  License(LicensePayload),
  Observation(ObservationPayload),
  Relation(RelationPayload),
}

impl Payload {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Party(_) => EntityKind::Party,
      Self::Thing(_) => EntityKind::Thing,
      Self::Datastream(_) => EntityKind::Datastream,
      Self::MultiDatastream(_) => EntityKind::MultiDatastream,
      Self::ObservationGroup(_) => EntityKind::ObservationGroup,
      Self::Campaign(_) => EntityKind::Campaign,
      Self::License(_) => EntityKind::License,
      Self::Observation(_) => EntityKind::Observation,
      Self::Relation(_) => EntityKind::Relation,
    }
  }

  /// Decode a JSON body for the given kind.
  pub fn from_json(kind: EntityKind, value: serde_json::Value) -> Result<Self> {
    fn decode<T: serde::de::DeserializeOwned>(
      kind: EntityKind,
      value: serde_json::Value,
    ) -> Result<T> {
      serde_json::from_value(value)
        .map_err(|source| Error::InvalidPayload { kind, source })
    }

    let payload = match kind {
      EntityKind::Party => Self::Party(decode(kind, value)?),
      EntityKind::Thing => Self::Thing(decode(kind, value)?),
      EntityKind::Datastream => Self::Datastream(decode(kind, value)?),
      EntityKind::MultiDatastream => Self::MultiDatastream(decode(kind, value)?),
      EntityKind::ObservationGroup => Self::ObservationGroup(decode(kind, value)?),
      EntityKind::Campaign => Self::Campaign(decode(kind, value)?),
      EntityKind::License => Self::License(decode(kind, value)?),
      EntityKind::Observation => Self::Observation(decode(kind, value)?),
      EntityKind::Relation => Self::Relation(decode(kind, value)?),
    };
    if let Self::Observation(obs) = &payload {
      obs.stream()?;
    }
    Ok(payload)
  }

  /// Serialise the payload without its kind tag.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    Ok(match self {
      Self::Party(p) => serde_json::to_value(p)?,
      Self::Thing(p) => serde_json::to_value(p)?,
      Self::Datastream(p) | Self::MultiDatastream(p) => serde_json::to_value(p)?,
      Self::ObservationGroup(p) => serde_json::to_value(p)?,
      Self::Campaign(p) => serde_json::to_value(p)?,
      Self::License(p) => serde_json::to_value(p)?,
      Self::Observation(p) => serde_json::to_value(p)?,
      Self::Relation(p) => serde_json::to_value(p)?,
    })
  }

  /// The owner link, for owned kinds.
  pub fn party(&self) -> Option<&PartyRef> {
    match self {
      Self::Thing(p) => p.party.as_ref(),
      Self::Datastream(p) | Self::MultiDatastream(p) => p.party.as_ref(),
      Self::ObservationGroup(p) => p.party.as_ref(),
      Self::Campaign(p) => p.party.as_ref(),
      _ => None,
    }
  }

  /// Membership sets the payload declares, as `(kind of the other end, ids)`.
  /// Each declared set replaces the current one; inline groups are not
  /// included until they have been created.
  pub fn memberships(&self) -> Vec<(EntityKind, Vec<Uuid>)> {
    let declared = |kind, ids: &Option<Vec<Uuid>>| ids.clone().map(|ids| (kind, ids));
    let sets = match self {
      Self::Observation(p) => {
        let groups = p.groups.as_ref().map(|groups| {
          groups
            .iter()
            .filter_map(|g| match g {
              GroupRef::Id(r) => Some(r.id),
              GroupRef::Inline(_) => None,
            })
            .collect()
        });
        vec![declared(EntityKind::ObservationGroup, &groups)]
      }
      Self::ObservationGroup(p) => vec![declared(EntityKind::Observation, &p.observations)],
      Self::Datastream(p) | Self::MultiDatastream(p) => {
        vec![declared(EntityKind::Campaign, &p.campaigns)]
      }
      Self::Campaign(p) => vec![
        declared(EntityKind::Datastream, &p.datastreams),
        declared(EntityKind::MultiDatastream, &p.multi_datastreams),
      ],
      _ => Vec::new(),
    };
    sets.into_iter().flatten().collect()
  }

  /// The licence link, for licensed kinds.
  pub fn license(&self) -> Option<&LicenseRef> {
    match self {
      Self::Datastream(p) | Self::MultiDatastream(p) => p.license.as_ref(),
      Self::ObservationGroup(p) => p.license.as_ref(),
      Self::Campaign(p) => p.license.as_ref(),
      _ => None,
    }
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A merge-patch: the typed payload, plus the attributes the request set to
/// `null`, which typed fields cannot tell apart from absent ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
  pub payload: Payload,
  pub cleared: Vec<String>,
}

impl Patch {
  pub fn from_json(kind: EntityKind, value: serde_json::Value) -> Result<Self> {
    let cleared = match &value {
      serde_json::Value::Object(map) => {
        map.iter().filter(|(_, v)| v.is_null()).map(|(k, _)| k.clone()).collect()
      }
      _ => Vec::new(),
    };
    Ok(Self { payload: Payload::from_json(kind, value)?, cleared })
  }

  pub fn kind(&self) -> EntityKind { self.payload.kind() }
}

impl From<Payload> for Patch {
  fn from(payload: Payload) -> Self { Self { payload, cleared: Vec::new() } }
}
