//! The single-owner state machine.
//!
//! One generic guard serves every owned kind; per-kind differences are
//! carried by [`OwnedKind`] (mandatory owner, display name) and the
//! [`OwnedPayload`] capability. Observations and Relations have no owner of
//! their own and borrow the owner of their stream (the `derived_*` guards).

use std::collections::BTreeSet;

use custos_core::{
  entity::{EntityKind, EntityRef},
  party::{PartyId, PartyPayload, PartyRef},
  payload::{
    CampaignPayload, DatastreamPayload, ObservationGroupPayload, Payload, ThingPayload,
  },
  state::EntityState,
};
use tracing::debug;
use uuid::Uuid;

use crate::{GuardContext, Mutation, PolicyError, Result};

/// Longest parent chain walked to find an owner (Relation → Observation →
/// stream).
const MAX_PARENT_DEPTH: usize = 4;

// ─── Capability ──────────────────────────────────────────────────────────────

/// Access to the owner link of a payload.
pub trait OwnedPayload {
  fn party(&self) -> Option<&PartyRef>;
  fn party_mut(&mut self) -> &mut Option<PartyRef>;
}

macro_rules! owned_payload {
  ($($ty:ty),+) => {$(
    impl OwnedPayload for $ty {
      fn party(&self) -> Option<&PartyRef> { self.party.as_ref() }
      fn party_mut(&mut self) -> &mut Option<PartyRef> { &mut self.party }
    }
  )+};
}

owned_payload!(ThingPayload, DatastreamPayload, ObservationGroupPayload, CampaignPayload);

/// The owner capability of a payload, for owned kinds.
pub fn owned_payload_mut(payload: &mut Payload) -> Option<&mut dyn OwnedPayload> {
  match payload {
    Payload::Thing(p) => Some(p),
    Payload::Datastream(p) | Payload::MultiDatastream(p) => Some(p),
    Payload::ObservationGroup(p) => Some(p),
    Payload::Campaign(p) => Some(p),
    _ => None,
  }
}

/// Per-kind parameters of the ownership rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedKind {
  pub kind:           EntityKind,
  /// Creation without an owner is rejected rather than defaulted.
  pub owner_required: bool,
}

impl OwnedKind {
  pub fn of(kind: EntityKind) -> Option<Self> {
    kind.is_owned().then(|| Self {
      kind,
      owner_required: matches!(kind, EntityKind::ObservationGroup | EntityKind::Campaign),
    })
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Ownership of a persisted entity relative to the acting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerState {
  Unlinked,
  LinkedSelf,
  LinkedOther(PartyId),
}

impl OwnerState {
  pub fn classify(owner: Option<PartyId>, caller: PartyId) -> Self {
    match owner {
      None => Self::Unlinked,
      Some(owner) if owner == caller => Self::LinkedSelf,
      Some(owner) => Self::LinkedOther(owner),
    }
  }
}

/// The owner a payload asks for, completing an inline Party that leaves out
/// its `authId` with the caller's id. Malformed ids are `InvalidArgument`.
fn requested_owner(owned: &mut dyn OwnedPayload, caller: PartyId) -> Result<Option<PartyId>> {
  if let Some(PartyRef::Inline(inline)) = owned.party_mut()
    && inline.auth_id.is_none()
  {
    inline.auth_id = Some(caller.to_string());
  }
  Ok(owned.party().map(PartyRef::declared_id).transpose()?.flatten())
}

fn not_linked(kind: EntityKind) -> PolicyError {
  PolicyError::forbidden(format!("{kind} not linked to a Party"))
}

fn owned_by_other(kind: EntityKind) -> PolicyError {
  PolicyError::forbidden(format!("{kind} is owned by another Party"))
}

// ─── Owned kinds ─────────────────────────────────────────────────────────────

/// Create-time rules. May amend the payload with the derived owner.
pub fn check_create(
  ctx: &GuardContext<'_>,
  meta: OwnedKind,
  owned: &mut dyn OwnedPayload,
) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  let requested = requested_owner(owned, caller)?;

  if requested.is_none() && meta.owner_required {
    return Err(PolicyError::invalid(format!("{} must have a Party", meta.kind)));
  }
  if ctx.is_admin() {
    return Ok(());
  }

  match requested {
    Some(owner) if owner != caller => Err(PolicyError::invalid(
      "owner must represent the acting caller or be omitted",
    )),
    Some(_) => Ok(()),
    None => {
      debug!(kind = %meta.kind, %caller, "linking new entity to the caller's Party");
      *owned.party_mut() = Some(PartyRef::Inline(PartyPayload::for_auth_id(caller.to_string())));
      Ok(())
    }
  }
}

/// Update-time rules against the persisted owner of `id`.
pub fn check_update(
  ctx: &GuardContext<'_>,
  meta: OwnedKind,
  id: &str,
  owned: &mut dyn OwnedPayload,
) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  let requested = requested_owner(owned, caller)?;
  if ctx.is_admin() {
    return Ok(());
  }

  let state = ctx.load(meta.kind, id)?;
  match (OwnerState::classify(state.owner, caller), requested) {
    (OwnerState::Unlinked, None) => Err(not_linked(meta.kind)),
    (OwnerState::Unlinked, Some(owner)) if owner == caller => Ok(()),
    (OwnerState::Unlinked, Some(_)) => Err(PolicyError::invalid(
      "owner must represent the acting caller",
    )),
    (OwnerState::LinkedOther(_), _) => Err(owned_by_other(meta.kind)),
    (OwnerState::LinkedSelf, Some(owner)) if owner != caller => {
      if ctx.config.transfer_ownership_enabled {
        debug!(kind = %meta.kind, id, from = %caller, to = %owner, "ownership transfer");
        Ok(())
      } else {
        Err(PolicyError::forbidden(format!(
          "transfer of ownership of {} is not allowed",
          meta.kind
        )))
      }
    }
    (OwnerState::LinkedSelf, _) => Ok(()),
  }
}

/// Delete-time rules: only the owner (or an admin) may delete.
pub fn check_delete(ctx: &GuardContext<'_>, kind: EntityKind, id: &str) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  if ctx.is_admin() {
    return Ok(());
  }

  let state = ctx.load(kind, id)?;
  match OwnerState::classify(state.owner, caller) {
    OwnerState::LinkedSelf => Ok(()),
    OwnerState::Unlinked => Err(not_linked(kind)),
    OwnerState::LinkedOther(_) => Err(owned_by_other(kind)),
  }
}

// ─── Derived ownership ───────────────────────────────────────────────────────

/// Walk up the parent chain to the nearest owned entity.
///
/// A missing link anywhere in the chain yields `None`; dangling references
/// are reported by payload validation, not here.
pub fn owning_ancestor(ctx: &GuardContext<'_>, state: EntityState) -> Result<Option<EntityState>> {
  let mut current = state;
  for _ in 0..MAX_PARENT_DEPTH {
    if current.kind.is_owned() {
      return Ok(Some(current));
    }
    let Some(parent) = current.parent.take() else {
      return Ok(None);
    };
    match ctx.try_load(parent.kind, &parent.id)? {
      Some(next) => current = next,
      None => return Ok(None),
    }
  }
  Ok(None)
}

/// The caller must own the entity `state` borrows its ownership from.
fn check_derived(ctx: &GuardContext<'_>, caller: PartyId, state: EntityState) -> Result<()> {
  let kind = state.kind;
  let Some(ancestor) = owning_ancestor(ctx, state)? else {
    return Err(not_linked(kind));
  };
  match OwnerState::classify(ancestor.owner, caller) {
    OwnerState::LinkedSelf => Ok(()),
    OwnerState::Unlinked => Err(PolicyError::forbidden(format!(
      "{} of {kind} not linked to a Party",
      ancestor.kind
    ))),
    OwnerState::LinkedOther(_) => Err(PolicyError::forbidden(format!(
      "{} of {kind} is owned by another Party",
      ancestor.kind
    ))),
  }
}

/// A new derived-ownership entity hanging off `parent`.
pub fn check_derived_create(
  ctx: &GuardContext<'_>,
  kind: EntityKind,
  parent: Option<EntityRef>,
) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  if ctx.is_admin() {
    return Ok(());
  }
  let Some(parent) = parent else {
    return Err(not_linked(kind));
  };
  check_derived(ctx, caller, EntityState::new(kind, "").with_parent(parent))
}

/// Update of a derived-ownership entity, optionally re-parenting it to
/// `new_parent`: the caller must own both the current and the new ancestor.
pub fn check_derived_update(
  ctx: &GuardContext<'_>,
  kind: EntityKind,
  id: &str,
  new_parent: Option<EntityRef>,
) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  if ctx.is_admin() {
    return Ok(());
  }
  let state = ctx.load(kind, id)?;
  check_derived(ctx, caller, state)?;
  match new_parent {
    Some(parent) => check_derived(ctx, caller, EntityState::new(kind, id).with_parent(parent)),
    None => Ok(()),
  }
}

pub fn check_derived_delete(ctx: &GuardContext<'_>, kind: EntityKind, id: &str) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  if ctx.is_admin() {
    return Ok(());
  }
  let state = ctx.load(kind, id)?;
  check_derived(ctx, caller, state)
}

/// The parent a derived-ownership payload points at, if it names one.
fn declared_parent(payload: &Payload) -> Result<Option<EntityRef>> {
  Ok(match payload {
    Payload::Observation(p) => p.stream()?.map(|(kind, id)| EntityRef::new(kind, id.to_string())),
    Payload::Relation(p) => p.subject.map(|id| EntityRef::new(EntityKind::Observation, id.to_string())),
    _ => None,
  })
}

// ─── Memberships ─────────────────────────────────────────────────────────────

/// The caller must own an entity it adds to or drops from a membership set,
/// since the change shows up on that entity too. Observations are judged by
/// their stream. Dangling ids are left to the store to report.
fn check_link_end(ctx: &GuardContext<'_>, caller: PartyId, kind: EntityKind, id: &str) -> Result<()> {
  let Some(state) = ctx.try_load(kind, id)? else {
    return Ok(());
  };
  let owner = owning_ancestor(ctx, state)?.and_then(|ancestor| ancestor.owner);
  match OwnerState::classify(owner, caller) {
    OwnerState::LinkedSelf => Ok(()),
    OwnerState::Unlinked => Err(PolicyError::forbidden(format!(
      "{kind} {id} not linked to a Party"
    ))),
    OwnerState::LinkedOther(_) => Err(PolicyError::forbidden(format!(
      "{kind} {id} is owned by another Party"
    ))),
  }
}

/// Membership changes of `payload`: every id entering or leaving a declared
/// set must belong to the caller. `target` is the entity being updated.
pub fn check_links(ctx: &GuardContext<'_>, target: Option<&str>, payload: &Payload) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let declared = payload.memberships();
  if declared.is_empty() {
    return Ok(());
  }
  let caller = ctx.caller()?;
  if ctx.is_admin() {
    return Ok(());
  }

  let current = match target {
    Some(id) => Some(ctx.load(payload.kind(), id)?),
    None => None,
  };
  for (kind, ids) in declared {
    let wanted: BTreeSet<String> = ids.iter().map(Uuid::to_string).collect();
    let existing: BTreeSet<String> = current
      .iter()
      .flat_map(|state| state.linked(kind))
      .map(str::to_owned)
      .collect();
    for id in wanted.symmetric_difference(&existing) {
      check_link_end(ctx, caller, kind, id)?;
    }
  }
  Ok(())
}

// ─── Registry adapters ───────────────────────────────────────────────────────

pub fn on_create(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  let Mutation::Create(payload) = mutation else { return Ok(()) };
  let Some(meta) = OwnedKind::of(payload.kind()) else { return Ok(()) };
  match owned_payload_mut(payload) {
    Some(owned) => check_create(ctx, meta, owned),
    None => Ok(()),
  }
}

pub fn on_update(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  let Mutation::Update { id, patch } = mutation else { return Ok(()) };
  let Some(meta) = OwnedKind::of(patch.kind()) else { return Ok(()) };
  match owned_payload_mut(patch) {
    Some(owned) => check_update(ctx, meta, id, owned),
    None => Ok(()),
  }
}

pub fn on_delete(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Delete { kind, id } => check_delete(ctx, *kind, id),
    _ => Ok(()),
  }
}

pub fn derived_on_create(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Create(payload) => {
      check_derived_create(ctx, payload.kind(), declared_parent(payload)?)
    }
    _ => Ok(()),
  }
}

pub fn derived_on_update(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Update { id, patch } => {
      check_derived_update(ctx, patch.kind(), id, declared_parent(patch)?)
    }
    _ => Ok(()),
  }
}

pub fn on_links(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Create(payload) => check_links(ctx, None, payload),
    Mutation::Update { id, patch } => check_links(ctx, Some(id), patch),
    Mutation::Delete { .. } => Ok(()),
  }
}

pub fn derived_on_delete(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Delete { kind, id } => check_derived_delete(ctx, *kind, id),
    _ => Ok(()),
  }
}
