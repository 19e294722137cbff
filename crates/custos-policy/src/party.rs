//! Guards for the Party entity itself.
//!
//! A Party is owned by the identity it was derived from. Non-admins can only
//! create and update their own Party, can never re-key it, and can never
//! delete it. Admins may re-key a Party by giving it a new `authId`.

use custos_core::{
  entity::EntityKind,
  party::{PartyId, PartyPayload},
  payload::Payload,
};

use crate::{GuardContext, Mutation, PolicyError, Result};

/// Create: the Party must represent the caller, unless the caller is an
/// admin. A missing `authId` is filled in with the caller's id.
pub fn check_create(ctx: &GuardContext<'_>, party: &mut PartyPayload) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  let auth_id = party.auth_id.get_or_insert_with(|| caller.to_string());
  let declared = PartyId::from_auth_id(auth_id);
  if ctx.is_admin() || declared == caller {
    Ok(())
  } else {
    Err(PolicyError::invalid("Party authId must represent the acting caller"))
  }
}

pub fn check_update(ctx: &GuardContext<'_>, id: &str, patch: &PartyPayload) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  let caller = ctx.caller()?;
  let target = PartyId::parse(id)?;
  if ctx.is_admin() {
    return Ok(());
  }

  ctx.load(EntityKind::Party, id)?;
  if target != caller {
    return Err(PolicyError::forbidden("Party can only be updated by its own identity"));
  }
  match &patch.auth_id {
    Some(auth_id) if PartyId::from_auth_id(auth_id) != target => {
      Err(PolicyError::forbidden("Party authId cannot be changed"))
    }
    _ => Ok(()),
  }
}

pub fn check_delete(ctx: &GuardContext<'_>) -> Result<()> {
  if !ctx.config.enforce_ownership {
    return Ok(());
  }
  ctx.caller()?;
  if ctx.is_admin() {
    Ok(())
  } else {
    Err(PolicyError::forbidden("Party cannot be deleted"))
  }
}

// ─── Registry adapters ───────────────────────────────────────────────────────

pub fn on_create(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Create(Payload::Party(party)) => check_create(ctx, party),
    _ => Ok(()),
  }
}

pub fn on_update(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Update { id, patch: Payload::Party(patch) } => check_update(ctx, id, patch),
    _ => Ok(()),
  }
}

pub fn on_delete(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  match mutation {
    Mutation::Delete { kind: EntityKind::Party, .. } => check_delete(ctx),
    _ => Ok(()),
  }
}
