//! Storage backends for the visa lifecycle engine.
//!
//! [`SqliteStore`] keeps one JSON document per application in SQLite, via
//! [`tokio_rusqlite`] so database access runs off the async runtime.
//! [`FsBlobStore`] keeps attachments as plain files under a root directory.

mod encode;
mod schema;
mod store;

pub mod blob;
pub mod error;

pub use blob::FsBlobStore;
pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
