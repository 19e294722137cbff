//! Error types for `custos-core`, plus the coarse classification every crate
//! in the workspace maps its errors onto.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid Party id: {0:?}")]
  InvalidPartyId(String),

  #[error("unknown entity kind: {0:?}")]
  UnknownEntityKind(String),

  #[error("invalid {kind} payload: {source}")]
  InvalidPayload {
    kind:   crate::entity::EntityKind,
    #[source]
    source: serde_json::Error,
  },

  #[error("{0} must reference either a Datastream or a MultiDatastream, not both")]
  AmbiguousStream(crate::entity::EntityKind),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The transport-independent category of a failure.
///
/// The API layer maps these onto status codes; nothing below it knows about
/// HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// No principal where one is required.
  Unauthenticated,
  /// Principal known but not entitled.
  Forbidden,
  /// The payload is malformed or self-contradictory.
  InvalidArgument,
  NotFound,
  Conflict,
  Internal,
}

/// Implemented by every error type that can cross the store boundary.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::InvalidPartyId(_)
      | Error::UnknownEntityKind(_)
      | Error::InvalidPayload { .. }
      | Error::AmbiguousStream(_) => ErrorKind::InvalidArgument,
      Error::Serialization(_) => ErrorKind::Internal,
    }
  }
}
