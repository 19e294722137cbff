//! Entity kinds of the sensor catalog and typed references between entities.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::Error;

/// Every entity kind the policy layer knows about.
///
/// The string form (`Display`, `FromStr`) is the singular entity name and is
/// also what the store writes into its `kind` columns.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
  IntoStaticStr,
)]
pub enum EntityKind {
  Party,
  Thing,
  Datastream,
  MultiDatastream,
  ObservationGroup,
  Campaign,
  License,
  Observation,
  Relation,
}

impl EntityKind {
  /// The plural collection name used in resource paths, e.g. `Things`.
  pub fn collection(self) -> &'static str {
    match self {
      Self::Party => "Parties",
      Self::Thing => "Things",
      Self::Datastream => "Datastreams",
      Self::MultiDatastream => "MultiDatastreams",
      Self::ObservationGroup => "ObservationGroups",
      Self::Campaign => "Campaigns",
      Self::License => "Licenses",
      Self::Observation => "Observations",
      Self::Relation => "Relations",
    }
  }

  pub fn from_collection(name: &str) -> Result<Self, Error> {
    use strum::IntoEnumIterator as _;
    Self::iter()
      .find(|k| k.collection() == name)
      .ok_or_else(|| Error::UnknownEntityKind(name.to_owned()))
  }

  /// Kinds that carry a direct owner Party reference.
  pub fn is_owned(self) -> bool {
    matches!(
      self,
      Self::Thing
        | Self::Datastream
        | Self::MultiDatastream
        | Self::ObservationGroup
        | Self::Campaign
    )
  }

  /// Kinds that carry a License reference.
  pub fn is_licensed(self) -> bool {
    matches!(
      self,
      Self::Datastream
        | Self::MultiDatastream
        | Self::ObservationGroup
        | Self::Campaign
    )
  }

  /// Kinds whose ownership is borrowed from a parent entity.
  pub fn is_derived_owned(self) -> bool {
    matches!(self, Self::Observation | Self::Relation)
  }
}

/// A typed pointer to a persisted entity.
///
/// Ids are kept as strings: Licenses are keyed by their textual id, every
/// other kind by a hyphenated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
  pub kind: EntityKind,
  pub id:   String,
}

impl EntityRef {
  pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
    Self { kind, id: id.into() }
  }
}

impl std::fmt::Display for EntityRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}({})", self.kind, self.id)
  }
}
