//! The authenticated caller, as handed over by the authentication layer.

use serde::{Deserialize, Serialize};

/// An authenticated caller. Anonymous callers are represented by the absence
/// of a `Principal` (`Option<&Principal>` is `None`), never by a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  /// Opaque identity string issued by the identity provider.
  pub identity: String,
  /// Explicit admin capability granted by the authentication layer.
  #[serde(default)]
  pub admin:    bool,
}

impl Principal {
  pub fn new(identity: impl Into<String>) -> Self {
    Self { identity: identity.into(), admin: false }
  }

  pub fn admin(identity: impl Into<String>) -> Self {
    Self { identity: identity.into(), admin: true }
  }

  pub fn is_admin(&self) -> bool { self.admin }
}
