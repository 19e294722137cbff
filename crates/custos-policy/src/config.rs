//! Policy configuration, read once at startup.

use serde::Deserialize;
use url::Url;

/// Feature switches for the policy engine.
///
/// Every field has a default so a config file may omit the whole section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
  /// Enforce the single-owner invariant. When off, ownership guards pass
  /// everything through untouched.
  pub enforce_ownership:          bool,
  /// Enforce licence rules (reserved ids, compatibility).
  pub enforce_licensing:          bool,
  /// Enforce stream ⇄ group/campaign licence compatibility. Only effective
  /// while `enforce_licensing` is on.
  pub enforce_group_licensing:    bool,
  /// Allow an owner to hand an entity over to another Party.
  pub transfer_ownership_enabled: bool,
  /// Base URL the predefined licence definitions are published under.
  pub default_license_domain:     Url,
}

impl PolicyConfig {
  /// Whether compatibility checks between streams and groups/campaigns run.
  pub fn group_licensing_active(&self) -> bool {
    self.enforce_licensing && self.enforce_group_licensing
  }

  /// A configuration with every check switched off.
  pub fn permissive() -> Self {
    Self {
      enforce_ownership: false,
      enforce_licensing: false,
      enforce_group_licensing: false,
      ..Self::default()
    }
  }
}

impl Default for PolicyConfig {
  fn default() -> Self {
    Self {
      enforce_ownership:          true,
      enforce_licensing:          true,
      enforce_group_licensing:    true,
      transfer_ownership_enabled: false,
      default_license_domain:     Url::parse("https://creativecommons.org/")
        .expect("static URL is valid"),
    }
  }
}
