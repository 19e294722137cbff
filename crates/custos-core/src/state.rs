//! Persisted state as seen by the policy engine, and the loader that fetches it.

use crate::{
  entity::{EntityKind, EntityRef},
  party::PartyId,
};

/// The slice of an entity's persisted state that policy decisions depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
  pub kind:    EntityKind,
  pub id:      String,
  /// Linked owner Party. For a Party this is the Party itself.
  pub owner:   Option<PartyId>,
  /// Linked License id.
  pub license: Option<String>,
  /// The entity ownership is borrowed from: the stream of an Observation, the
  /// Subject Observation of a Relation.
  pub parent:  Option<EntityRef>,
  /// Memberships in either direction: the groups or campaigns a member
  /// belongs to, the members of a group or campaign.
  pub links:   Vec<EntityRef>,
}

impl EntityState {
  pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
    Self { kind, id: id.into(), owner: None, license: None, parent: None, links: Vec::new() }
  }

  pub fn with_owner(mut self, owner: PartyId) -> Self {
    self.owner = Some(owner);
    self
  }

  pub fn with_license(mut self, license: impl Into<String>) -> Self {
    self.license = Some(license.into());
    self
  }

  pub fn with_parent(mut self, parent: EntityRef) -> Self {
    self.parent = Some(parent);
    self
  }

  pub fn with_link(mut self, link: EntityRef) -> Self {
    self.links.push(link);
    self
  }

  /// Ids of the linked entities of `kind`.
  pub fn linked(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
    self.links.iter().filter(move |l| l.kind == kind).map(|l| l.id.as_str())
  }

  pub fn entity_ref(&self) -> EntityRef { EntityRef::new(self.kind, self.id.clone()) }
}

pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Synchronous access to the current persisted state of an entity.
///
/// Implementations are expected to read within the same transaction as the
/// write being gated, so that the decision and the write see the same state.
pub trait EntityLoader {
  /// Fetch an entity's state. Returns `None` if it does not exist.
  fn get(&self, kind: EntityKind, id: &str) -> Result<Option<EntityState>, LoadError>;

  /// Every ObservationGroup holding at least one Observation of `stream`.
  fn groups_of_stream(&self, stream: &EntityRef) -> Result<Vec<EntityState>, LoadError>;
}
