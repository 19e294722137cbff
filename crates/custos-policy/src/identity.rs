//! Identity resolution: external principal → canonical Party id.

use custos_core::{party::PartyId, principal::Principal};

use crate::{PolicyError, Result};

/// The canonical Party id of the acting caller.
///
/// Fails with [`PolicyError::Unauthenticated`] for anonymous callers. The
/// mapping is pure: see [`PartyId::from_auth_id`].
pub fn resolve(principal: Option<&Principal>) -> Result<PartyId> {
  let principal = principal.ok_or(PolicyError::Unauthenticated)?;
  Ok(PartyId::from_auth_id(&principal.identity))
}

/// Whether the caller carries the admin capability. Never true for anonymous
/// callers.
pub fn is_admin(principal: Option<&Principal>) -> bool {
  principal.is_some_and(Principal::is_admin)
}
