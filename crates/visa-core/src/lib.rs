//! Application lifecycle and status-history engine for the visa portal.
//!
//! The crate has no HTTP or database dependencies. It owns the Status
//! Catalog, the History Log types, timeline reconstruction and the
//! Transition Processor; storage is reached only through the traits in
//! [`store`].

// Storage implementations use native `async fn`; the trait methods spell out
// their `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod history;
pub mod status;
pub mod store;
pub mod timeline;
pub mod transition;

pub use error::{Error, Result};
pub use status::Status;
pub use transition::{Attachment, TransitionOptions, TransitionProcessor};
