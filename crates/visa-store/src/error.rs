//! Error type for `visa-store`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A row whose columns disagree with its stored document.
  #[error("corrupt application row: {0}")]
  Corrupt(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A blob path that is absolute, empty, or walks out of the blob root.
  #[error("invalid blob path: {0:?}")]
  InvalidBlobPath(String),

  #[error("application {0} is already stored")]
  AlreadyExists(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
