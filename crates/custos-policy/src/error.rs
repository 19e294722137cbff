//! Policy error type.

use custos_core::{Classify, ErrorKind, entity::EntityKind, state::LoadError};
use thiserror::Error;

/// A guard failure. The first three variants are the policy outcomes proper;
/// the rest report that a decision could not be made.
#[derive(Debug, Error)]
pub enum PolicyError {
  #[error("authentication required")]
  Unauthenticated,

  #[error("{0}")]
  Forbidden(String),

  #[error("{0}")]
  InvalidArgument(String),

  #[error("{kind} {id} not found")]
  NotFound { kind: EntityKind, id: String },

  #[error("failed to load current state: {0}")]
  Loader(#[source] LoadError),
}

impl PolicyError {
  pub fn forbidden(message: impl Into<String>) -> Self {
    Self::Forbidden(message.into())
  }

  pub fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidArgument(message.into())
  }
}

impl From<custos_core::Error> for PolicyError {
  fn from(e: custos_core::Error) -> Self { Self::InvalidArgument(e.to_string()) }
}

impl Classify for PolicyError {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Unauthenticated => ErrorKind::Unauthenticated,
      Self::Forbidden(_) => ErrorKind::Forbidden,
      Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::Loader(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = PolicyError> = std::result::Result<T, E>;
