//! Licence-compatibility guards for group and campaign memberships.
//!
//! Every time a stream's content is associated with an ObservationGroup or a
//! Campaign, the stream licence must be compatible with the group/campaign
//! licence per [`compat::compatible`]. On updates, a side whose licence is
//! not part of the patch is judged by its persisted licence, and a licence
//! change is checked against every membership already in place. A missing
//! licence on either side is treated as unconstrained.

use custos_core::{
  entity::EntityKind,
  license::LicenseRef,
  payload::{GroupRef, Payload},
  state::EntityState,
};
use tracing::debug;
use uuid::Uuid;

use crate::{GuardContext, Mutation, PolicyError, Result, compat};

fn check_pair(stream: Option<&str>, group: Option<&str>, group_kind: EntityKind) -> Result<()> {
  match (stream, group) {
    (Some(s), Some(g)) if !compat::compatible(s, g) => {
      debug!(stream = s, group = g, %group_kind, "incompatible licences");
      Err(PolicyError::invalid(format!(
        "License {s} of the Datastream is not compatible with License {g} of the {group_kind}"
      )))
    }
    _ => Ok(()),
  }
}

fn stored_license(ctx: &GuardContext<'_>, kind: EntityKind, id: &str) -> Result<Option<String>> {
  Ok(ctx.try_load(kind, id)?.and_then(|state| state.license))
}

/// Licence of the stream an existing Observation belongs to.
fn observation_stream_license(ctx: &GuardContext<'_>, id: &str) -> Result<Option<String>> {
  match ctx.try_load(EntityKind::Observation, id)?.and_then(|s| s.parent) {
    Some(stream) => stored_license(ctx, stream.kind, &stream.id),
    None => Ok(None),
  }
}

/// The licence a payload asks for, falling back to the persisted one when
/// the payload leaves it out.
fn effective_license(requested: Option<&LicenseRef>, existing: Option<&EntityState>) -> Option<String> {
  match requested {
    Some(license) => license.id().map(str::to_owned),
    None => existing.and_then(|state| state.license.clone()),
  }
}

/// Split a mutation into its payload and, for updates, the target id.
fn payload_and_target(mutation: &Mutation) -> Option<(&Payload, Option<&str>)> {
  match mutation {
    Mutation::Create(payload) => Some((payload, None)),
    Mutation::Update { id, patch } => Some((patch, Some(id.as_str()))),
    Mutation::Delete { .. } => None,
  }
}

/// Persisted state of the entity being updated.
fn persisted(ctx: &GuardContext<'_>, kind: EntityKind, target: Option<&str>) -> Result<Option<EntityState>> {
  match target {
    Some(id) => ctx.try_load(kind, id),
    None => Ok(None),
  }
}

/// The members a write leaves in place: the declared set if there is one,
/// otherwise, when `relinked` says the other side of every membership
/// changed, the persisted set.
fn members(
  declared: Option<&[Uuid]>,
  existing: Option<&EntityState>,
  kind: EntityKind,
  relinked: bool,
) -> Vec<String> {
  match declared {
    Some(ids) => ids.iter().map(Uuid::to_string).collect(),
    None if relinked => existing
      .map(|state| state.linked(kind).map(str::to_owned).collect())
      .unwrap_or_default(),
    None => Vec::new(),
  }
}

/// Observation joins groups (by reference or inline), or moves to another
/// stream while staying in its groups.
pub fn observation_groups(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  if !ctx.config.group_licensing_active() {
    return Ok(());
  }
  let Some((Payload::Observation(obs), target)) = payload_and_target(mutation) else {
    return Ok(());
  };
  let stream = obs.stream()?;
  if obs.groups.is_none() && stream.is_none() {
    return Ok(());
  }
  let existing = persisted(ctx, EntityKind::Observation, target)?;

  let group_licenses = match obs.groups.as_deref() {
    Some(groups) => groups
      .iter()
      .map(|group| match group {
        GroupRef::Id(r) => stored_license(ctx, EntityKind::ObservationGroup, &r.id.to_string()),
        GroupRef::Inline(g) => Ok(g.license.as_ref().and_then(LicenseRef::id).map(str::to_owned)),
      })
      .collect::<Result<Vec<_>>>()?,
    None => members(None, existing.as_ref(), EntityKind::ObservationGroup, true)
      .iter()
      .map(|id| stored_license(ctx, EntityKind::ObservationGroup, id))
      .collect::<Result<Vec<_>>>()?,
  };
  if group_licenses.is_empty() {
    return Ok(());
  }

  let stream_license = match (stream, existing.and_then(|state| state.parent)) {
    (Some((kind, id)), _) => stored_license(ctx, kind, &id.to_string())?,
    (None, Some(parent)) => stored_license(ctx, parent.kind, &parent.id)?,
    (None, None) => None,
  };
  let Some(stream_license) = stream_license else {
    return Ok(());
  };

  for group_license in group_licenses {
    check_pair(Some(&stream_license), group_license.as_deref(), EntityKind::ObservationGroup)?;
  }
  Ok(())
}

/// ObservationGroup takes in observations, or is relicensed with members.
pub fn group_observations(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  if !ctx.config.group_licensing_active() {
    return Ok(());
  }
  let Some((Payload::ObservationGroup(group), target)) = payload_and_target(mutation) else {
    return Ok(());
  };
  let relicensed = group.license.is_some();
  if group.observations.is_none() && !relicensed {
    return Ok(());
  }

  let existing = persisted(ctx, EntityKind::ObservationGroup, target)?;
  let Some(group_license) = effective_license(group.license.as_ref(), existing.as_ref()) else {
    return Ok(());
  };
  let observations =
    members(group.observations.as_deref(), existing.as_ref(), EntityKind::Observation, relicensed);
  for obs in observations {
    let stream_license = observation_stream_license(ctx, &obs)?;
    check_pair(stream_license.as_deref(), Some(&group_license), EntityKind::ObservationGroup)?;
  }
  Ok(())
}

/// Datastream or MultiDatastream joins campaigns, or is relicensed while its
/// observations sit in groups and it sits in campaigns.
pub fn stream_memberships(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  if !ctx.config.group_licensing_active() {
    return Ok(());
  }
  let Some((payload, target)) = payload_and_target(mutation) else {
    return Ok(());
  };
  let (Payload::Datastream(stream) | Payload::MultiDatastream(stream)) = payload else {
    return Ok(());
  };
  let relicensed = stream.license.is_some();
  if stream.campaigns.is_none() && !relicensed {
    return Ok(());
  }

  let existing = persisted(ctx, payload.kind(), target)?;
  let Some(stream_license) = effective_license(stream.license.as_ref(), existing.as_ref()) else {
    return Ok(());
  };
  let campaigns =
    members(stream.campaigns.as_deref(), existing.as_ref(), EntityKind::Campaign, relicensed);
  for campaign in campaigns {
    let campaign_license = stored_license(ctx, EntityKind::Campaign, &campaign)?;
    check_pair(Some(&stream_license), campaign_license.as_deref(), EntityKind::Campaign)?;
  }

  if let Some(state) = existing.as_ref().filter(|_| relicensed) {
    for group in ctx.groups_of_stream(&state.entity_ref())? {
      check_pair(Some(&stream_license), group.license.as_deref(), EntityKind::ObservationGroup)?;
    }
  }
  Ok(())
}

/// Campaign takes in streams, or is relicensed with members.
pub fn campaign_streams(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  if !ctx.config.group_licensing_active() {
    return Ok(());
  }
  let Some((Payload::Campaign(campaign), target)) = payload_and_target(mutation) else {
    return Ok(());
  };
  let relicensed = campaign.license.is_some();
  let declared = [
    (EntityKind::Datastream, campaign.datastreams.as_deref()),
    (EntityKind::MultiDatastream, campaign.multi_datastreams.as_deref()),
  ];
  if !relicensed && declared.iter().all(|(_, ids)| ids.is_none()) {
    return Ok(());
  }

  let existing = persisted(ctx, EntityKind::Campaign, target)?;
  let Some(campaign_license) = effective_license(campaign.license.as_ref(), existing.as_ref())
  else {
    return Ok(());
  };
  for (kind, ids) in declared {
    for id in members(ids, existing.as_ref(), kind, relicensed) {
      let stream_license = stored_license(ctx, kind, &id)?;
      check_pair(stream_license.as_deref(), Some(&campaign_license), EntityKind::Campaign)?;
    }
  }
  Ok(())
}
