//! The predefined licences: seed data and the guard that freezes them.

use custos_core::{
  entity::EntityKind,
  license::{License, LicenseRef},
  payload::{GroupRef, Payload},
};
use strum::IntoEnumIterator;
use url::Url;

use crate::{GuardContext, Mutation, PolicyError, Result, compat::ReservedLicense};

const FROZEN: &str = "License with this id cannot be created/updated";

impl ReservedLicense {
  fn name(self) -> &'static str {
    match self {
      Self::Pd => "Public Domain",
      Self::By => "Attribution",
      Self::BySa => "Attribution-ShareAlike",
      Self::ByNc => "Attribution-NonCommercial",
      Self::ByNd => "Attribution-NoDerivatives",
      Self::ByNcSa => "Attribution-NonCommercial-ShareAlike",
      Self::ByNcNd => "Attribution-NonCommercial-NoDerivatives",
    }
  }

  /// Path of the legal code, relative to the licence domain.
  fn path(self) -> &'static str {
    match self {
      Self::Pd => "publicdomain/zero/1.0/",
      Self::By => "licenses/by/4.0/",
      Self::BySa => "licenses/by-sa/4.0/",
      Self::ByNc => "licenses/by-nc/4.0/",
      Self::ByNd => "licenses/by-nd/4.0/",
      Self::ByNcSa => "licenses/by-nc-sa/4.0/",
      Self::ByNcNd => "licenses/by-nc-nd/4.0/",
    }
  }

  pub fn seed(self, domain: &Url) -> License {
    let name = match self {
      Self::Pd => "CC0 1.0 Universal (Public Domain)".to_owned(),
      _ => format!("Creative Commons {} 4.0 International", self.name()),
    };
    License {
      id: self.to_string(),
      name,
      definition: domain.join(self.path()).ok().map(String::from),
      description: Some(format!("Predefined licence {self}")),
      attribution_text: None,
      logo: None,
    }
  }
}

/// The seven predefined licences, with definitions under `domain`.
pub fn seed_licenses(domain: &Url) -> Vec<License> {
  ReservedLicense::iter().map(|l| l.seed(domain)).collect()
}

fn reject_reserved(id: Option<&str>) -> Result<()> {
  match id {
    Some(id) if ReservedLicense::parse(id).is_some() => Err(PolicyError::forbidden(FROZEN)),
    _ => Ok(()),
  }
}

/// License create/update/delete. Needs an authenticated caller; reserved ids
/// are frozen, admins included.
pub fn on_license_mutation(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  if !ctx.config.enforce_licensing {
    return Ok(());
  }
  let id = match mutation {
    Mutation::Create(Payload::License(license)) => license.id.as_deref(),
    Mutation::Update { id, patch: Payload::License(_) } => Some(id.as_str()),
    Mutation::Delete { kind: EntityKind::License, id } => Some(id.as_str()),
    _ => return Ok(()),
  };
  ctx.caller()?;
  reject_reserved(id)
}

/// Inline licences nested in a licensed entity (or in an inline group of an
/// Observation) are creates too.
pub fn on_inline_license(ctx: &GuardContext<'_>, mutation: &mut Mutation) -> Result<()> {
  if !ctx.config.enforce_licensing {
    return Ok(());
  }
  let payload = match mutation {
    Mutation::Create(payload) | Mutation::Update { patch: payload, .. } => payload,
    Mutation::Delete { .. } => return Ok(()),
  };
  let inline = |license: Option<&LicenseRef>| match license {
    Some(LicenseRef::Inline(l)) => reject_reserved(l.id.as_deref()),
    _ => Ok(()),
  };
  if let Payload::Observation(obs) = payload {
    for group in obs.groups.iter().flatten() {
      if let GroupRef::Inline(g) = group {
        inline(g.license.as_ref())?;
      }
    }
    return Ok(());
  }
  inline(payload.license())
}
