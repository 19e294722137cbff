//! In-memory fixtures shared by the guard tests.

use std::collections::HashMap;

use custos_core::{
  entity::{EntityKind, EntityRef},
  party::PartyId,
  principal::Principal,
  state::{EntityLoader, EntityState, LoadError},
};

use crate::{GuardContext, PolicyConfig};

/// A loader over a fixed set of states.
#[derive(Default)]
pub struct MemoryLoader {
  states: HashMap<(EntityKind, String), EntityState>,
}

impl MemoryLoader {
  pub fn with(mut self, state: EntityState) -> Self {
    self.states.insert((state.kind, state.id.clone()), state);
    self
  }
}

impl EntityLoader for MemoryLoader {
  fn get(&self, kind: EntityKind, id: &str) -> Result<Option<EntityState>, LoadError> {
    Ok(self.states.get(&(kind, id.to_owned())).cloned())
  }

  fn groups_of_stream(&self, stream: &EntityRef) -> Result<Vec<EntityState>, LoadError> {
    let mut groups: Vec<EntityState> = self
      .states
      .values()
      .filter(|s| s.kind == EntityKind::Observation && s.parent.as_ref() == Some(stream))
      .flat_map(|obs| obs.linked(EntityKind::ObservationGroup))
      .filter_map(|id| self.states.get(&(EntityKind::ObservationGroup, id.to_owned())))
      .cloned()
      .collect();
    groups.sort_by(|a, b| a.id.cmp(&b.id));
    groups.dedup_by(|a, b| a.id == b.id);
    Ok(groups)
  }
}

pub fn party(identity: &str) -> PartyId {
  PartyId::from_auth_id(identity)
}

pub fn alice() -> Principal { Principal::new("alice") }

pub fn bob() -> Principal { Principal::new("bob") }

pub fn root() -> Principal { Principal::admin("root") }

pub fn owned(kind: EntityKind, id: &str, owner: &str) -> EntityState {
  EntityState::new(kind, id).with_owner(party(owner))
}

pub fn observation(id: &str, stream: EntityKind, stream_id: &str) -> EntityState {
  EntityState::new(EntityKind::Observation, id).with_parent(EntityRef::new(stream, stream_id))
}

pub fn ctx<'a>(
  config: &'a PolicyConfig,
  principal: Option<&'a Principal>,
  loader: &'a MemoryLoader,
) -> GuardContext<'a> {
  GuardContext::new(config, principal, loader)
}
