//! Error type for `custos-store-sqlite`.

use custos_core::{Classify, ErrorKind, entity::EntityKind};
use custos_policy::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] custos_core::Error),

  #[error(transparent)]
  Policy(#[from] PolicyError),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("{kind} {id} not found")]
  NotFound { kind: EntityKind, id: String },

  /// A payload names an entity that does not exist.
  #[error("referenced {kind} {id} does not exist")]
  DanglingReference { kind: EntityKind, id: String },

  #[error("{0}")]
  Invalid(String),

  #[error("{0}")]
  Conflict(String),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Policy(e) => e.kind(),
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::DanglingReference { .. } | Self::Invalid(_) => ErrorKind::InvalidArgument,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        ErrorKind::Conflict
      }
      Self::Database(_)
      | Self::Sqlite(_)
      | Self::Json(_)
      | Self::Uuid(_)
      | Self::DateParse(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
