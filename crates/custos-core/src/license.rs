//! License: the content licence attached to licensed entities.

use serde::{Deserialize, Serialize};

/// A persisted License. Licenses are keyed by a client-chosen textual id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
  pub id:               String,
  pub name:             String,
  pub definition:       Option<String>,
  pub description:      Option<String>,
  pub attribution_text: Option<String>,
  pub logo:             Option<String>,
}

/// A License as submitted by a client: a create body, an inline licence or a
/// merge-patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensePayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id:               Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:             Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub definition:       Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub attribution_text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub logo:             Option<String>,
}

/// Reference to an existing License.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseIdRef {
  pub id: String,
}

/// The licence link of a licensed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LicenseRef {
  Id(LicenseIdRef),
  Inline(LicensePayload),
}

impl LicenseRef {
  pub fn by_id(id: impl Into<String>) -> Self {
    Self::Id(LicenseIdRef { id: id.into() })
  }

  /// The licence id this reference carries; inline licences without an id
  /// carry none.
  pub fn id(&self) -> Option<&str> {
    match self {
      Self::Id(r) => Some(&r.id),
      Self::Inline(l) => l.id.as_deref(),
    }
  }
}
