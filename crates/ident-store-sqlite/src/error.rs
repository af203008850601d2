//! Error type for `ident-store-sqlite`.

use ident_core::{ErrorKind, store::StoreError};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ident_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown link precedence: {0:?}")]
  UnknownPrecedence(String),
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Sqlite(e) => classify(e),
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => classify(e),
      _ => ErrorKind::Internal,
    }
  }
}

/// Lock contention is the only SQLite failure worth retrying.
fn classify(e: &rusqlite::Error) -> ErrorKind {
  match e.sqlite_error_code() {
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => ErrorKind::Transient,
    _ => ErrorKind::Internal,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
