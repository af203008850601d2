//! Error types for `ident-core`.

use thiserror::Error;

use crate::contact::ContactId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("identity group {0} has no primary contact")]
  MissingPrimary(ContactId),

  #[error("identity group is empty")]
  EmptyGroup,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidInput(_) => ErrorKind::InvalidInput,
      Self::MissingPrimary(_) | Self::EmptyGroup => ErrorKind::Internal,
    }
  }
}

/// Coarse failure category, used by callers to pick a response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The caller supplied unusable input; retrying won't help.
  InvalidInput,
  /// The store was busy, locked or briefly unreachable.
  Transient,
  /// Anything else.
  Internal,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
