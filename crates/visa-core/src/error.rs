//! Error types for `visa-core`.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// A boxed error from a storage collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The storage step during which a backend error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStep {
  Insert,
  Load,
  List,
  Write,
}

impl fmt::Display for StoreStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Insert => "insert",
      Self::Load => "load",
      Self::List => "list",
      Self::Write => "write",
    })
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("application not found: {0}")]
  NotFound(Uuid),

  #[error("invalid status: {0:?}")]
  InvalidStatus(String),

  /// The binary-storage collaborator rejected the attachment. No history
  /// entry was appended.
  #[error("attachment upload failed: {0}")]
  UploadFailed(#[source] BoxError),

  /// A concurrent modification won the read-modify-write race twice in a row.
  #[error("application {0} was modified concurrently; retry the transition")]
  StoreWriteConflict(Uuid),

  #[error("store error during {step}: {source}")]
  Store {
    step:   StoreStep,
    #[source]
    source: BoxError,
  },
}

impl Error {
  pub(crate) fn store(
    step: StoreStep,
    source: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Store { step, source: Box::new(source) }
  }

  /// Whether repeating the whole operation may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::UploadFailed(_) | Self::StoreWriteConflict(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
