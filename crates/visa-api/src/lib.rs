//! JSON REST API for the visa portal.
//!
//! Exposes an axum [`Router`] backed by any [`ApplicationStore`] and
//! [`BlobStore`] pair. Every route except `GET /statuses` requires an
//! `Authorization: Bearer` token; see [`auth`]. TLS and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", visa_api::api_router(state))
//! ```

pub mod applications;
pub mod auth;
pub mod error;
pub mod extract;
pub mod statuses;
pub mod transitions;

use std::sync::Arc;

use axum::{
  Router,
  extract::{DefaultBodyLimit, FromRef},
  routing::{get, post, put},
};
use visa_core::{
  TransitionProcessor,
  store::{ApplicationStore, BlobStore},
};

pub use auth::Authenticator;
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, B> {
  pub processor:            TransitionProcessor<S, B>,
  pub auth:                 Arc<Authenticator>,
  /// Largest decoded attachment accepted by the transitions endpoint.
  pub max_attachment_bytes: usize,
}

impl<S, B> Clone for AppState<S, B> {
  fn clone(&self) -> Self {
    Self {
      processor:            self.processor.clone(),
      auth:                 Arc::clone(&self.auth),
      max_attachment_bytes: self.max_attachment_bytes,
    }
  }
}

impl<S, B> FromRef<AppState<S, B>> for Arc<Authenticator> {
  fn from_ref(state: &AppState<S, B>) -> Self { Arc::clone(&state.auth) }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, B>(state: AppState<S, B>) -> Router<()>
where
  S: ApplicationStore + 'static,
  B: BlobStore + 'static,
{
  // Base64 inflates by 4/3; leave headroom for the rest of the JSON body.
  let body_limit = state.max_attachment_bytes / 3 * 4 + 64 * 1024;

  Router::new()
    .route("/statuses", get(statuses::list))
    .route(
      "/applications",
      get(applications::list::<S, B>).post(applications::create::<S, B>),
    )
    .route("/applications/{id}", get(applications::get_one::<S, B>))
    .route("/applications/{id}/timeline", get(applications::timeline::<S, B>))
    .route("/applications/{id}/transitions", post(transitions::apply::<S, B>))
    .route("/applications/{id}/handler", put(applications::assign_handler::<S, B>))
    .layer(DefaultBodyLimit::max(body_limit))
    .with_state(state)
}
