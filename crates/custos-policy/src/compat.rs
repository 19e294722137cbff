//! The licence-compatibility relation.
//!
//! A fixed lookup table between the seven predefined Creative Commons
//! licences: may content published under the Datastream licence (row) be
//! placed in a group or campaign published under another licence (column)?
//! Nothing is inferred beyond the table: the relation is neither symmetric
//! nor transitive, and ids outside the predefined set are unconstrained.

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The predefined licences. Declaration order is the table index order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ReservedLicense {
  #[strum(serialize = "CC_PD")]
  Pd,
  #[strum(serialize = "CC_BY")]
  By,
  #[strum(serialize = "CC_BY_SA")]
  BySa,
  #[strum(serialize = "CC_BY_NC")]
  ByNc,
  #[strum(serialize = "CC_BY_ND")]
  ByNd,
  #[strum(serialize = "CC_BY_NC_SA")]
  ByNcSa,
  #[strum(serialize = "CC_BY_NC_ND")]
  ByNcNd,
}

impl ReservedLicense {
  pub fn parse(id: &str) -> Option<Self> { id.parse().ok() }

  fn index(self) -> usize { self as usize }
}

/// Whether `id` is one of the predefined licence ids.
pub fn is_reserved(id: &str) -> bool { ReservedLicense::parse(id).is_some() }

const Y: bool = true;
const N: bool = false;

/// Rows: Datastream licence. Columns: group/campaign licence.
/// Order: PD, BY, BY_SA, BY_NC, BY_ND, BY_NC_SA, BY_NC_ND.
#[rustfmt::skip]
const TABLE: [[bool; 7]; 7] = [
  /* PD       */ [Y, Y, Y, Y, Y, Y, Y],
  /* BY       */ [N, Y, Y, Y, N, Y, N],
  /* BY_SA    */ [N, Y, Y, N, N, N, N],
  /* BY_NC    */ [N, Y, N, Y, N, Y, N],
  /* BY_ND    */ [N, N, N, N, N, N, N],
  /* BY_NC_SA */ [N, Y, N, Y, N, Y, N],
  /* BY_NC_ND */ [N, N, N, N, N, N, N],
];

/// May a Datastream licensed `stream` be associated with a group or campaign
/// licensed `group`?
pub fn compatible(stream: &str, group: &str) -> bool {
  match (ReservedLicense::parse(stream), ReservedLicense::parse(group)) {
    (Some(s), Some(g)) => TABLE[s.index()][g.index()],
    _ => true,
  }
}
