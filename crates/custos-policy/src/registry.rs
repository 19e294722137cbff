//! The guard table and the engine that runs it.

use std::collections::HashMap;

use custos_core::{
  entity::EntityKind,
  payload::Payload,
  principal::Principal,
  state::EntityLoader,
};
use strum::{Display, IntoEnumIterator};
use tracing::{debug, warn};

use crate::{
  GuardContext, PolicyConfig, PolicyError, Result, licensing, ownership, party, reserved,
};

/// Where in a write's lifecycle a guard runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LifecyclePoint {
  /// Before a create payload is validated and stored.
  BeforeCreate,
  /// After nested inline entities of a create have been resolved, right
  /// before the row is written.
  AfterCreateValidated,
  BeforeUpdate,
  BeforeDelete,
}

/// The write a guard is asked about. Guards may amend create and update
/// payloads in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  Create(Payload),
  Update { id: String, patch: Payload },
  Delete { kind: EntityKind, id: String },
}

impl Mutation {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Create(payload) => payload.kind(),
      Self::Update { patch, .. } => patch.kind(),
      Self::Delete { kind, .. } => *kind,
    }
  }

  pub fn into_payload(self) -> Option<Payload> {
    match self {
      Self::Create(payload) | Self::Update { patch: payload, .. } => Some(payload),
      Self::Delete { .. } => None,
    }
  }
}

pub type GuardFn = fn(&GuardContext<'_>, &mut Mutation) -> Result<()>;

// ─── Registry ────────────────────────────────────────────────────────────────

/// `(kind, lifecycle point) → guards`, run in registration order.
#[derive(Debug, Clone, Default)]
pub struct GuardRegistry {
  guards: HashMap<(EntityKind, LifecyclePoint), Vec<GuardFn>>,
}

impl GuardRegistry {
  pub fn empty() -> Self { Self::default() }

  pub fn register(
    &mut self,
    kind: EntityKind,
    point: LifecyclePoint,
    guard: GuardFn,
  ) -> &mut Self {
    self.guards.entry((kind, point)).or_default().push(guard);
    self
  }

  pub fn guards(&self, kind: EntityKind, point: LifecyclePoint) -> &[GuardFn] {
    self.guards.get(&(kind, point)).map(Vec::as_slice).unwrap_or_default()
  }

  /// Every guard of the catalog, wired to the points it applies at.
  pub fn standard() -> Self {
    use EntityKind as K;
    use LifecyclePoint::*;

    let mut r = Self::empty();

    r.register(K::Party, BeforeCreate, party::on_create)
      .register(K::Party, BeforeUpdate, party::on_update)
      .register(K::Party, BeforeDelete, party::on_delete);

    r.register(K::License, BeforeCreate, reserved::on_license_mutation)
      .register(K::License, BeforeUpdate, reserved::on_license_mutation)
      .register(K::License, BeforeDelete, reserved::on_license_mutation);

    for kind in EntityKind::iter().filter(|k| k.is_owned()) {
      r.register(kind, BeforeCreate, ownership::on_create)
        .register(kind, BeforeUpdate, ownership::on_update)
        .register(kind, BeforeDelete, ownership::on_delete);
    }
    for kind in EntityKind::iter().filter(|k| k.is_licensed()) {
      r.register(kind, BeforeCreate, reserved::on_inline_license)
        .register(kind, BeforeUpdate, reserved::on_inline_license);
    }

    // Observations borrow their stream's owner on update and delete only.
    r.register(K::Observation, BeforeCreate, reserved::on_inline_license)
      .register(K::Observation, BeforeUpdate, ownership::derived_on_update)
      .register(K::Observation, BeforeUpdate, reserved::on_inline_license)
      .register(K::Observation, BeforeDelete, ownership::derived_on_delete);
    r.register(K::Relation, BeforeCreate, ownership::derived_on_create)
      .register(K::Relation, BeforeUpdate, ownership::derived_on_update)
      .register(K::Relation, BeforeDelete, ownership::derived_on_delete);

    let memberships: [(EntityKind, GuardFn); 5] = [
      (K::Observation, licensing::observation_groups),
      (K::ObservationGroup, licensing::group_observations),
      (K::Datastream, licensing::stream_memberships),
      (K::MultiDatastream, licensing::stream_memberships),
      (K::Campaign, licensing::campaign_streams),
    ];
    for (kind, guard) in memberships {
      r.register(kind, BeforeCreate, ownership::on_links)
        .register(kind, BeforeUpdate, ownership::on_links)
        .register(kind, AfterCreateValidated, guard)
        .register(kind, BeforeUpdate, guard);
    }

    r
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The configured policy: a [`PolicyConfig`] plus the guards to run.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
  config:   PolicyConfig,
  registry: GuardRegistry,
}

impl PolicyEngine {
  pub fn new(config: PolicyConfig) -> Self {
    Self::with_registry(config, GuardRegistry::standard())
  }

  pub fn with_registry(config: PolicyConfig, registry: GuardRegistry) -> Self {
    Self { config, registry }
  }

  pub fn config(&self) -> &PolicyConfig { &self.config }

  /// Run every guard registered for the mutation's kind at `point`, stopping
  /// at the first failure.
  pub fn evaluate(
    &self,
    point: LifecyclePoint,
    principal: Option<&Principal>,
    loader: &dyn EntityLoader,
    mutation: &mut Mutation,
  ) -> Result<()> {
    let kind = mutation.kind();
    let ctx = GuardContext::new(&self.config, principal, loader);
    for guard in self.registry.guards(kind, point) {
      if let Err(e) = guard(&ctx, mutation) {
        match &e {
          PolicyError::Loader(_) | PolicyError::NotFound { .. } => {
            debug!(%kind, %point, error = %e, "guard could not decide")
          }
          _ => warn!(
            %kind,
            %point,
            identity = principal.map(|p| p.identity.as_str()),
            error = %e,
            "mutation denied"
          ),
        }
        return Err(e);
      }
    }
    debug!(%kind, %point, "mutation allowed");
    Ok(())
  }

  fn run(
    &self,
    point: LifecyclePoint,
    principal: Option<&Principal>,
    loader: &dyn EntityLoader,
    mut mutation: Mutation,
  ) -> Result<Mutation> {
    self.evaluate(point, principal, loader, &mut mutation)?;
    Ok(mutation)
  }

  /// Gate a create; returns the payload, possibly amended (e.g. with the
  /// caller assigned as owner).
  pub fn before_create(
    &self,
    principal: Option<&Principal>,
    loader: &dyn EntityLoader,
    payload: Payload,
  ) -> Result<Payload> {
    let mutation =
      self.run(LifecyclePoint::BeforeCreate, principal, loader, Mutation::Create(payload))?;
    Ok(Self::payload_of(mutation))
  }

  /// Gate a create once its nested entities exist.
  pub fn after_create_validated(
    &self,
    principal: Option<&Principal>,
    loader: &dyn EntityLoader,
    payload: Payload,
  ) -> Result<Payload> {
    let mutation =
      self.run(LifecyclePoint::AfterCreateValidated, principal, loader, Mutation::Create(payload))?;
    Ok(Self::payload_of(mutation))
  }

  /// Gate a merge-patch of entity `id`.
  pub fn before_update(
    &self,
    principal: Option<&Principal>,
    loader: &dyn EntityLoader,
    id: &str,
    patch: Payload,
  ) -> Result<Payload> {
    let mutation = Mutation::Update { id: id.to_owned(), patch };
    let mutation = self.run(LifecyclePoint::BeforeUpdate, principal, loader, mutation)?;
    Ok(Self::payload_of(mutation))
  }

  pub fn before_delete(
    &self,
    principal: Option<&Principal>,
    loader: &dyn EntityLoader,
    kind: EntityKind,
    id: &str,
  ) -> Result<()> {
    let mut mutation = Mutation::Delete { kind, id: id.to_owned() };
    self.evaluate(LifecyclePoint::BeforeDelete, principal, loader, &mut mutation)
  }

  fn payload_of(mutation: Mutation) -> Payload {
    // Guards amend payloads but never change the mutation variant.
    mutation.into_payload().unwrap_or_else(|| unreachable!("write turned into a delete"))
  }
}

impl Default for PolicyEngine {
  fn default() -> Self { Self::new(PolicyConfig::default()) }
}
