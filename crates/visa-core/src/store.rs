//! Storage collaborators consumed by the lifecycle engine.
//!
//! [`ApplicationStore`] is the document store holding one aggregate per
//! application; [`BlobStore`] persists binary attachments. Both are
//! implemented by backends (e.g. `visa-store`); the engine depends only on
//! these traits.

use std::future::Future;

use bytes::Bytes;
use uuid::Uuid;

use crate::{history::Application, status::Status};

// ─── Document store ──────────────────────────────────────────────────────────

/// An aggregate together with the store version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
  pub value:   T,
  pub version: u64,
}

/// The result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
  /// The aggregate was written; this is its new version.
  Written(u64),
  /// Someone else wrote the aggregate since it was read.
  Conflict,
  /// The aggregate no longer exists.
  Missing,
}

/// Page size [`ApplicationStore::list`] uses when a query sets no `limit`.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Parameters for [`ApplicationStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationQuery {
  pub status:           Option<Status>,
  pub applicant_id:     Option<String>,
  pub assigned_handler: Option<String>,
  /// Defaults to [`DEFAULT_LIST_LIMIT`].
  pub limit:            Option<usize>,
  pub offset:           Option<usize>,
}

/// Abstraction over the document store holding application aggregates.
///
/// `put` is a compare-and-swap on the version returned by `get`, which is
/// what makes the engine's read-append-write safe without a lock.
pub trait ApplicationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a brand-new aggregate at version 1.
  fn insert<'a>(
    &'a self,
    application: &'a Application,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Read an aggregate and its current version. `None` if it does not exist.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Versioned<Application>>, Self::Error>>
  + Send
  + '_;

  /// Replace the aggregate if its stored version still equals `expected`.
  fn put<'a>(
    &'a self,
    application: &'a Application,
    expected: u64,
  ) -> impl Future<Output = Result<PutOutcome, Self::Error>> + Send + 'a;

  /// List aggregates matching `query`, oldest first.
  fn list<'a>(
    &'a self,
    query: &'a ApplicationQuery,
  ) -> impl Future<Output = Result<Vec<Application>, Self::Error>> + Send + 'a;
}

// ─── Binary storage ──────────────────────────────────────────────────────────

/// Where a blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
  pub url:          String,
  pub path:         String,
  pub content_type: String,
}

/// Abstraction over binary storage for attachments.
pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Store `bytes` at `path`, replacing anything already there.
  fn store<'a>(
    &'a self,
    bytes: Bytes,
    path: &'a str,
  ) -> impl Future<Output = Result<StoredBlob, Self::Error>> + Send + 'a;

  /// Delete the blob at `path`. Deleting a missing blob is not an error.
  fn remove<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
