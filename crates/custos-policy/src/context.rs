//! Per-evaluation context handed to every guard.

use custos_core::{
  entity::{EntityKind, EntityRef},
  party::PartyId,
  principal::Principal,
  state::{EntityLoader, EntityState},
};

use crate::{PolicyConfig, PolicyError, Result, identity};

/// Everything a guard may consult. Built fresh for each evaluation; the
/// principal is always passed in explicitly.
#[derive(Clone, Copy)]
pub struct GuardContext<'a> {
  pub config:    &'a PolicyConfig,
  pub principal: Option<&'a Principal>,
  pub loader:    &'a dyn EntityLoader,
}

impl<'a> GuardContext<'a> {
  pub fn new(
    config: &'a PolicyConfig,
    principal: Option<&'a Principal>,
    loader: &'a dyn EntityLoader,
  ) -> Self {
    Self { config, principal, loader }
  }

  pub fn is_admin(&self) -> bool { identity::is_admin(self.principal) }

  /// The acting caller's Party id; `Unauthenticated` for anonymous callers.
  pub fn caller(&self) -> Result<PartyId> { identity::resolve(self.principal) }

  /// Load an entity that must exist.
  pub fn load(&self, kind: EntityKind, id: &str) -> Result<EntityState> {
    self
      .try_load(kind, id)?
      .ok_or_else(|| PolicyError::NotFound { kind, id: id.to_owned() })
  }

  /// Load an entity that may be missing.
  pub fn try_load(&self, kind: EntityKind, id: &str) -> Result<Option<EntityState>> {
    self.loader.get(kind, id).map_err(PolicyError::Loader)
  }

  /// ObservationGroups holding Observations of `stream`.
  pub fn groups_of_stream(&self, stream: &EntityRef) -> Result<Vec<EntityState>> {
    self.loader.groups_of_stream(stream).map_err(PolicyError::Loader)
  }
}

impl std::fmt::Debug for GuardContext<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GuardContext")
      .field("config", self.config)
      .field("principal", &self.principal)
      .finish_non_exhaustive()
  }
}
